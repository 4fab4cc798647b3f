use std::sync::Arc;

use tabill_core::payment::{CustomerDirectory, PaymentGateway, PaymentService};
use tabill_core::shell::{CacheStorage, Network, ShellWorker};

pub type Shell = ShellWorker<Arc<dyn CacheStorage>, Arc<dyn Network>>;
pub type Payments = PaymentService<Arc<dyn CustomerDirectory>, Arc<dyn PaymentGateway>>;

pub struct State {
    pub shell: Shell,
    /// `None` when gateway credentials are missing
    pub payments: Option<Payments>,
}

impl State {
    pub fn new(shell: Shell, payments: Option<Payments>) -> Arc<Self> {
        Arc::new(Self {
            shell,
            payments,
        })
    }
}
