//! Console logging for wasm hosts.

use tracing::Level;

/// Install the panic hook and a `tracing` subscriber writing to the browser
/// console. Safe to call more than once; later calls keep the first subscriber.
pub fn init() {
    init_with_level(if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    });
}

pub fn init_with_level(level: Level) {
    console_error_panic_hook::set_once();

    use tracing::subscriber::set_global_default;
    use tracing_subscriber::Registry;
    use tracing_subscriber::layer::SubscriberExt;

    let wasm_layer = tracing_wasm::WASMLayer::new(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(level)
            .build(),
    );
    let reg = Registry::default().with(wasm_layer);
    let _ = set_global_default(reg);
}
