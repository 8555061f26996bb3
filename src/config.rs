/// Admission ceilings checked by the dispatcher before starting a job.
///
/// A tick that finds any ceiling exceeded dispatches nothing and waits for
/// the next tick. All three are per-node figures.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Maximum one-minute CPU load average before the node stops taking jobs.
    pub max_cpu_load: f64,
    /// Maximum used-memory percentage (0-100) before the node stops taking jobs.
    pub max_memory_usage: f64,
    /// Maximum concurrent workers on this node.
    pub max_workers: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_cpu_load: 3.0,
            max_memory_usage: 85.0,
            max_workers: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between dispatcher poll ticks.
    pub poll_interval_ms: u64,
    /// Interval between reconciler dead-job sweeps.
    pub sweep_interval_ms: u64,
    pub admission: AdmissionConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            sweep_interval_ms: 60_000,
            admission: AdmissionConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn new(poll_interval_ms: u64, sweep_interval_ms: u64) -> Self {
        Self {
            poll_interval_ms,
            sweep_interval_ms,
            ..Default::default()
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.admission.max_workers = max_workers;
        self
    }

    pub fn with_cpu_ceiling(mut self, max_cpu_load: f64) -> Self {
        self.admission.max_cpu_load = max_cpu_load;
        self
    }

    pub fn with_memory_ceiling(mut self, max_memory_usage: f64) -> Self {
        self.admission.max_memory_usage = max_memory_usage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_config_default() {
        let cfg = AdmissionConfig::default();
        assert_eq!(cfg.max_cpu_load, 3.0);
        assert_eq!(cfg.max_memory_usage, 85.0);
        assert_eq!(cfg.max_workers, 4);
    }

    #[test]
    fn scheduler_config_default() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.poll_interval_ms, 1_000);
        assert_eq!(cfg.sweep_interval_ms, 60_000);
        assert_eq!(cfg.admission.max_workers, 4);
    }

    #[test]
    fn scheduler_config_builders() {
        let cfg = SchedulerConfig::new(250, 5_000)
            .with_max_workers(8)
            .with_cpu_ceiling(6.0)
            .with_memory_ceiling(95.0);
        assert_eq!(cfg.poll_interval_ms, 250);
        assert_eq!(cfg.sweep_interval_ms, 5_000);
        assert_eq!(cfg.admission.max_workers, 8);
        assert_eq!(cfg.admission.max_cpu_load, 6.0);
        assert_eq!(cfg.admission.max_memory_usage, 95.0);
    }
}
