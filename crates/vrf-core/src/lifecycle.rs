//! Process restart hooks.
//!
//! GPU resources do not survive an application restart, so process-scoped
//! caches register a reset hook here. The host calls [`restart`] from its
//! restart path after draining outstanding loads.

use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::debug;

type Hook = Box<dyn Fn() + Send + Sync>;

fn hooks() -> &'static Mutex<Vec<Hook>> {
    static HOOKS: OnceLock<Mutex<Vec<Hook>>> = OnceLock::new();
    HOOKS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register `hook` to run on every [`restart`].
pub fn on_restart(hook: impl Fn() + Send + Sync + 'static) {
    hooks().lock().push(Box::new(hook));
}

/// Run all registered restart hooks in registration order.
pub fn restart() {
    let hooks = hooks().lock();
    debug!("Running {} restart hooks", hooks.len());
    for hook in hooks.iter() {
        hook();
    }
}
