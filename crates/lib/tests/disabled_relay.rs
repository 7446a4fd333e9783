//! A relay without a backend URL stays disabled: one configuration error is logged and no
//! message reaches the backend or gets a reply. Kept in its own test binary because it installs
//! the global logger.

use async_trait::async_trait;
use relay::brain::MemoryBrain;
use relay::channels::{ChannelHandle, ChannelRegistry, InboundMessage};
use relay::config::{RelayConfig, RelaySettings};
use relay::processor::spawn_processor;
use relay::router::build_dispatcher;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records written by the crate under test, as (level, message).
static RECORDS: OnceLock<Mutex<Vec<(log::Level, String)>>> = OnceLock::new();

fn records() -> &'static Mutex<Vec<(log::Level, String)>> {
    RECORDS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Logger that keeps the crate's own records in RECORDS.
struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.target().starts_with("relay")
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            if let Ok(mut r) = records().lock() {
                r.push((record.level(), record.args().to_string()));
            }
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChannelHandle for Recorder {
    fn id(&self) -> &str {
        "test"
    }

    fn stop(&self) {}

    async fn send_message(&self, room_id: &str, text: &str) -> Result<(), String> {
        self.sent
            .lock()
            .unwrap()
            .push((room_id.to_string(), text.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn missing_backend_url_logs_one_error_and_relays_nothing() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Debug);

    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    // A blank URL counts as unset; the key alone does not enable the relay.
    let settings = RelaySettings::resolve_with(&RelayConfig::default(), |key| match key {
        "BACKEND_URL" => Some("   ".to_string()),
        "BACKEND_API_KEY" => Some("secret".to_string()),
        "START_PATTERN" => Some("lex".to_string()),
        _ => None,
    });
    let dispatcher = Arc::new(build_dispatcher(&settings, Arc::new(MemoryBrain::new())));
    assert!(dispatcher.is_empty());

    let recorder = Arc::new(Recorder::default());
    let channels = Arc::new(ChannelRegistry::new());
    channels.register(recorder.clone()).await;
    let (tx, rx) = mpsc::channel(8);
    let processor = spawn_processor(dispatcher, channels, true, rx);
    for text in ["@relay lex hello", "lex again", "anything"] {
        tx.send(InboundMessage::new("test", "1", "#test", text))
            .await
            .expect("processor running");
    }
    drop(tx);
    processor.await.expect("processor finished");

    assert!(recorder.sent.lock().unwrap().is_empty());
    assert!(server.received_requests().await.expect("recording enabled").is_empty());
    let errors: Vec<String> = records()
        .lock()
        .unwrap()
        .iter()
        .filter(|(level, _)| *level == log::Level::Error)
        .map(|(_, msg)| msg.clone())
        .collect();
    assert_eq!(errors.len(), 1, "errors: {:?}", errors);
    assert!(errors[0].contains("BACKEND_URL"), "errors: {:?}", errors);
}
