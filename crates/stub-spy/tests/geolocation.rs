use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use stub_spy::{Arg, MethodTable, StubBehavior, StubRegistry};
use trellis_core_types::EngineError;

fn geolocation() -> Arc<MethodTable> {
    Arc::new(
        MethodTable::new("navigator.geolocation").with_method("getCurrentPosition", |_| {
            Err(EngineError::Application("permission denied".into()))
        }),
    )
}

/// Mirrors how a page asks for a position and renders the answer.
fn request_location(table: &MethodTable) -> Option<String> {
    let rendered = Arc::new(Mutex::new(None));
    let sink = rendered.clone();
    let on_success = Arg::callback(move |args: &[Value]| {
        let coords = &args[0]["coords"];
        *sink.lock() = Some(format!(
            "Latitude: {}, Longitude: {}",
            coords["latitude"], coords["longitude"]
        ));
        Value::Null
    });
    let _ = table.invoke("getCurrentPosition", &[on_success]);
    let text = rendered.lock().clone();
    text
}

#[test]
fn fake_position_is_delivered_synchronously() {
    let table = geolocation();
    let registry = StubRegistry::new();
    let stub = registry
        .stub(
            &table,
            "getCurrentPosition",
            StubBehavior::calls_fake(|args| {
                if let Some(callback) = args.first().and_then(Arg::as_callback) {
                    callback(&[json!({
                        "coords": { "latitude": 11.1111, "longitude": -11.1111 }
                    })]);
                }
                Ok(Value::Null)
            }),
        )
        .unwrap();

    assert_eq!(
        request_location(&table).as_deref(),
        Some("Latitude: 11.1111, Longitude: -11.1111")
    );
    assert_eq!(stub.call_count(), 1);
    assert!(stub.calls()[0].args[0].as_callback().is_some());

    registry.restore_all();
    assert_eq!(request_location(&table), None);
}
