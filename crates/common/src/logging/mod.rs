//! Tracing subscriber setup shared by the binaries
//!
//! `RUST_LOG` wins over `observability.log_level`; output is JSON unless
//! `observability.json_logging` is off.

use crate::config::ObservabilityConfig;
use tracing::Subscriber;
use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

/// Build the subscriber without installing it
pub fn build_subscriber<W>(config: &ObservabilityConfig, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(writer);

    if config.json_logging {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.finish())
    }
}

/// Install the global subscriber writing to stdout
pub fn init_tracing(config: &ObservabilityConfig) {
    let subscriber = build_subscriber(config, std::io::stdout);

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Tracing already initialised: {}", e);
        return;
    }

    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logging,
        "Logging initialised"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(config: &ObservabilityConfig) -> String {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = build_subscriber(config, move || writer.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(service = %config.service_name, "Indexed 50/816 schemes...");
        });

        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_json_output_by_default() {
        let config = ObservabilityConfig::default();
        assert!(config.json_logging);

        let output = capture(&config);
        let line: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(line["fields"]["message"], "Indexed 50/816 schemes...");
        assert_eq!(line["fields"]["service"], "schemebot");
    }

    #[test]
    fn test_plain_output_when_json_disabled() {
        let config = ObservabilityConfig {
            json_logging: false,
            ..ObservabilityConfig::default()
        };

        let output = capture(&config);
        assert!(output.contains("Indexed 50/816 schemes..."));
        assert!(serde_json::from_str::<serde_json::Value>(output.trim()).is_err());
    }
}
