use proptest::prelude::*;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxloop::backends::{PrintFallback, SpeechBackend};
use voxloop::engine::SpeechOutputChain;
use voxloop::error::BackendError;
use voxloop::host::HostFamily;
use voxloop::router::{extract_query, Intent};

struct AlwaysFails(&'static str);

impl SpeechBackend for AlwaysFails {
    fn id(&self) -> &'static str {
        self.0
    }

    fn applies_to(&self, _host: HostFamily) -> bool {
        true
    }

    fn speak(&self, _text: &str, timeout: Duration) -> Result<(), BackendError> {
        Err(BackendError::TimedOut(timeout))
    }
}

proptest! {
    #[test]
    fn classify_is_pure(text in ".{0,60}", noise in prop::collection::vec(".{0,20}", 0..8)) {
        let first = Intent::classify(&text);
        for other in &noise {
            Intent::classify(other);
        }
        prop_assert_eq!(Intent::classify(&text), first);
    }

    #[test]
    fn exit_words_always_win(prefix in "[a-z ]{0,20}", word in "(exit|quit|goodbye|bye)") {
        let text = format!("{} {} what time is it", prefix, word);
        prop_assert_eq!(Intent::classify(&text), Intent::Exit);
    }

    #[test]
    fn extracted_query_is_the_rest_of_the_utterance(words in prop::collection::vec("[a-rt-z]{1,8}", 0..6)) {
        let utterance = format!("search {}", words.join(" "));
        let query = extract_query(&utterance);
        prop_assert!(!query.contains("search"));
        prop_assert_eq!(query, words.join(" "));
    }

    #[test]
    fn exhausted_chain_still_prints(text in "[ -~]{0,80}") {
        let printed = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink: Arc<Mutex<dyn Write + Send>> = printed.clone();
        let backends: Vec<Box<dyn SpeechBackend>> =
            vec![Box::new(AlwaysFails("a")), Box::new(AlwaysFails("b")), Box::new(AlwaysFails("c"))];
        let chain = SpeechOutputChain::with_fallback(
            backends,
            Duration::from_millis(1),
            PrintFallback::with_writer(sink),
        );

        prop_assert_eq!(chain.deliver(&text), Some("print"));
        let out = String::from_utf8(printed.lock().unwrap().clone()).unwrap();
        prop_assert_eq!(out, format!("[SPEAK]: {}\n", text));
    }
}
