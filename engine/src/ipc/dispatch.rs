//! Command dispatch: parse s-expression requests and route to handlers.

use lexpr::Value;
use tracing::{debug, warn};

use crate::events::escape_string;
use crate::session::TrackingSession;

/// Parse an s-expression request and run it against the session.
/// Always returns a response s-expression.
pub fn handle_message(session: &mut TrackingSession, raw: &str, now_ms: f64) -> String {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed s-expression: {}", e);
            return error_response(0, &format!("malformed s-expression: {e}"));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);
    debug!(msg_id, "command {:?}", msg_type);

    match msg_type.as_deref() {
        Some("status") => handle_status(session, msg_id),
        Some("metrics") => handle_metrics(session, msg_id, now_ms),
        Some("inventory") => handle_inventory(session, msg_id),
        Some("report") => handle_report(session, msg_id),
        Some("config") => handle_config(session, msg_id),
        Some("reset") => handle_reset(session, msg_id),
        Some("stop") => handle_stop(session, msg_id),
        Some("set-bob-threshold") => handle_set_bob_threshold(session, msg_id, &value),
        Some("set-slash-speed") => handle_set_slash_speed(session, msg_id, &value),
        Some(other) => error_response(msg_id, &format!("unknown message type: {other}")),
        None => error_response(msg_id, "missing :type field"),
    }
}

// ── Handlers ────────────────────────────────────────────────

fn handle_status(session: &mut TrackingSession, msg_id: i64) -> String {
    format!(
        "(:type :response :id {} :status :ok :session {})",
        msg_id,
        session.status_sexp()
    )
}

fn handle_metrics(session: &mut TrackingSession, msg_id: i64, now_ms: f64) -> String {
    format!(
        "(:type :response :id {} :status :ok :metrics {})",
        msg_id,
        session.metrics(now_ms).to_sexp()
    )
}

fn handle_inventory(session: &mut TrackingSession, msg_id: i64) -> String {
    let inventory = session.inventory();
    format!(
        "(:type :response :id {} :status :ok :total {} :inventory {})",
        msg_id,
        inventory.total(),
        inventory.to_sexp()
    )
}

fn handle_report(session: &mut TrackingSession, msg_id: i64) -> String {
    format!(
        "(:type :response :id {} :status :ok :report {})",
        msg_id,
        session.last_report().to_sexp()
    )
}

fn handle_config(session: &mut TrackingSession, msg_id: i64) -> String {
    format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id,
        session.config().config_sexp()
    )
}

fn handle_reset(session: &mut TrackingSession, msg_id: i64) -> String {
    session.reset();
    ok_response(msg_id)
}

fn handle_stop(session: &mut TrackingSession, msg_id: i64) -> String {
    session.stop();
    ok_response(msg_id)
}

fn handle_set_bob_threshold(session: &mut TrackingSession, msg_id: i64, value: &Value) -> String {
    let px = match get_float(value, "value") {
        Some(v) => v as f32,
        None => return error_response(msg_id, "missing :value"),
    };
    match session.set_bob_threshold(px) {
        Ok(()) => ok_response(msg_id),
        Err(e) => error_response(msg_id, &e.to_string()),
    }
}

fn handle_set_slash_speed(session: &mut TrackingSession, msg_id: i64, value: &Value) -> String {
    let speed = match get_float(value, "value") {
        Some(v) => v as f32,
        None => return error_response(msg_id, "missing :value"),
    };
    match session.set_slash_speed(speed) {
        Ok(()) => ok_response(msg_id),
        Err(e) => error_response(msg_id, &e.to_string()),
    }
}

// ── Helpers ────────────────────────────────────────────────

fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Extract a keyword value from an s-expression plist.
/// Walks cons pairs directly to find `:key` followed by its value.
/// Handles both `Value::Keyword("key")` (elisp parser) and
/// `Value::Symbol(":key")` (default parser) forms.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let car = pair.car();
        let is_key = match car {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            // Value is the car of the next cons cell
            if let Value::Cons(next) = pair.cdr() {
                let val = next.car();
                return match val {
                    Value::Keyword(v) => Some(v.to_string()),
                    Value::Symbol(v) => {
                        let s = v.to_string();
                        Some(s.strip_prefix(':').unwrap_or(&s).to_string())
                    }
                    Value::String(v) => Some(v.to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(if *b { "t" } else { "nil" }.to_string()),
                    Value::Null => Some("nil".to_string()),
                    _ => Some(val.to_string()),
                };
            }
            return None;
        }
        current = pair.cdr();
    }
    None
}

/// Extract an integer value from an s-expression plist.
fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Extract a floating-point value from an s-expression plist.
fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}
