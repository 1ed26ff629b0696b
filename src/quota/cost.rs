use std::time::Duration;

/// Turns a finished request into quota units.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostModel {
    time_cost_unit: Option<Duration>,
}

impl CostModel {
    /// `time_cost_unit` of `None` charges by request size only.
    pub fn new(time_cost_unit: Option<Duration>) -> Self {
        Self {
            time_cost_unit: time_cost_unit.filter(|unit| !unit.is_zero()),
        }
    }

    /// `max(base, ceil(elapsed / unit))`, never less than one.
    pub fn cost(&self, base: u64, elapsed: Duration) -> u64 {
        let base = base.max(1);
        match self.time_cost_unit {
            Some(unit) => {
                let by_time = (elapsed.as_secs_f64() / unit.as_secs_f64()).ceil() as u64;
                base.max(by_time)
            }
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_cost_without_time_unit() {
        let model = CostModel::new(None);
        assert_eq!(model.cost(5, Duration::from_secs(30)), 5);
        assert_eq!(model.cost(0, Duration::ZERO), 1);
    }

    #[test]
    fn test_slow_request_costs_by_duration() {
        let model = CostModel::new(Some(Duration::from_secs(2)));
        assert_eq!(model.cost(1, Duration::from_secs(6)), 3);
        assert_eq!(model.cost(1, Duration::from_millis(6100)), 4);
        assert_eq!(model.cost(1, Duration::from_millis(100)), 1);
        // Batch size still wins when larger
        assert_eq!(model.cost(10, Duration::from_secs(6)), 10);
    }
}
