//! In-memory log capture for asserting on what the session logged.
//!
//! Each event keeps its level, target, message, structured fields and the
//! name of the innermost span it was emitted in, so tests can check for
//! example that the engine logged a transition inside `session_engine`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Severity.
    pub level: Level,
    /// Emitting module path.
    pub target: String,
    /// The `message` field.
    pub message: String,
    /// Every other field, rendered.
    pub fields: BTreeMap<String, String>,
    /// Innermost enclosing span, if any.
    pub span: Option<&'static str>,
}

impl CapturedEvent {
    /// Rendered value of field `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Handle to the captured events. Cheap to clone.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    store: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// Snapshot of everything captured so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.store.lock().clone()
    }

    /// Whether any message contains `needle`.
    pub fn has_message(&self, needle: &str) -> bool {
        self.any(|e| e.message.contains(needle))
    }

    /// Whether any `level` message contains `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.any(|e| e.level == level && e.message.contains(needle))
    }

    /// How many events were logged at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.store.lock().iter().filter(|e| e.level == level).count()
    }

    /// Events from targets under `prefix`, e.g. `parley_session::engine`.
    pub fn events_for_target(&self, prefix: &str) -> Vec<CapturedEvent> {
        self.matching(|e| e.target.starts_with(prefix))
    }

    /// Events emitted inside a span called `name`.
    pub fn events_in_span(&self, name: &str) -> Vec<CapturedEvent> {
        self.matching(|e| e.span == Some(name))
    }

    /// Forget everything captured so far.
    pub fn clear(&self) {
        self.store.lock().clear();
    }

    fn any(&self, pred: impl Fn(&CapturedEvent) -> bool) -> bool {
        self.store.lock().iter().any(pred)
    }

    fn matching(&self, pred: impl Fn(&CapturedEvent) -> bool) -> Vec<CapturedEvent> {
        self.store.lock().iter().filter(|e| pred(e)).cloned().collect()
    }
}

#[derive(Default)]
struct Fields {
    message: String,
    rest: BTreeMap<String, String>,
}

impl Fields {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            name => {
                let _ = self.rest.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

impl<S> Layer<S> for CapturedLogs
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let meta = event.metadata();
        let span = ctx.event_span(event).map(|s| s.name());
        self.store.lock().push(CapturedEvent {
            level: *meta.level(),
            target: meta.target().to_string(),
            message: fields.message,
            fields: fields.rest,
            span,
        });
    }
}

/// Capture every event on the current thread until the guard drops.
///
/// Spawned tasks are covered as long as they run on this thread, which is
/// the case under the default current-thread `#[tokio::test]` runtime.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(logs.clone())
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}
