use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Teller som tåler at prometheus avviser den: da telles det bare ikke.
#[derive(Clone, Default)]
pub struct Counter(Option<IntCounter>);

impl Counter {
    pub fn inc(&self) {
        if let Some(c) = &self.0 {
            c.inc();
        }
    }

    pub fn get(&self) -> u64 {
        self.0.as_ref().map_or(0, |c| c.get())
    }
}

/// Tellere for synk-leddet. Hver instans har sitt eget register (ingen global tilstand).
#[derive(Clone)]
pub struct SyncCounters {
    registry: Registry,
    pub direct_sent: Counter,
    pub context_fallback: Counter,
    pub send_failures: Counter,
    pub transfers_queued: Counter,
    pub transfer_attempts: Counter,
    pub transfer_failures: Counter,
    pub transfers_delivered: Counter,
    pub payloads_rejected: Counter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Counter {
    let c = match IntCounter::new(name, help) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("metric {} disabled: {}", name, e);
            return Counter(None);
        }
    };
    if let Err(e) = registry.register(Box::new(c.clone())) {
        log::warn!("metric {} not registered: {}", name, e);
    }
    Counter(Some(c))
}

impl SyncCounters {
    pub fn new() -> Self {
        let registry = Registry::new();
        Self {
            direct_sent: counter(&registry, "sync_direct_sent_total", "messages delivered over the direct channel"),
            context_fallback: counter(&registry, "sync_context_fallback_total", "messages routed to the application context"),
            send_failures: counter(&registry, "sync_send_failures_total", "failed direct or context sends"),
            transfers_queued: counter(&registry, "sync_transfers_queued_total", "file transfers queued"),
            transfer_attempts: counter(&registry, "sync_transfer_attempts_total", "file transfer attempts"),
            transfer_failures: counter(&registry, "sync_transfer_failures_total", "failed file transfer attempts"),
            transfers_delivered: counter(&registry, "sync_transfers_delivered_total", "file transfers handed to the link"),
            payloads_rejected: counter(&registry, "sync_payloads_rejected_total", "incoming payloads ignored as unparseable"),
            registry,
        }
    }

    /// Prometheus tekstformat, for logg/CLI.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let families = self.registry.gather();
        if let Err(e) = TextEncoder::new().encode(&families, &mut buf) {
            log::warn!("metrics encode failed: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Default for SyncCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCounters")
            .field("direct_sent", &self.direct_sent.get())
            .field("context_fallback", &self.context_fallback.get())
            .field("transfers_delivered", &self.transfers_delivered.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_name_gives_silent_counter() {
        let registry = Registry::new();
        let c = counter(&registry, "not a metric name", "bad");
        c.inc();
        assert_eq!(c.get(), 0);
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn all_counters_are_rendered() {
        let counters = SyncCounters::new();
        counters.direct_sent.inc();
        let text = counters.render();
        assert!(text.contains("sync_direct_sent_total 1"), "{text}");
        assert!(text.contains("sync_payloads_rejected_total 0"));
    }
}
