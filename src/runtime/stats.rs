use serde::Serialize;

/// Running counters over every pass a runtime has executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Notification passes started (one per top-level commit or batch flush).
    pub passes: u64,
    pub commits: u64,
    pub rejections: u64,
    /// Effect bodies invoked, including ones that then failed.
    pub effects_run: u64,
    /// Notified effects whose triggers were unchanged since last observed.
    pub noop_skips: u64,
    /// Notifications dropped because the effect already ran in this pass.
    pub dedup_skips: u64,
    pub guard_skips: u64,
    /// Effects stopped because an inherited rule no longer held.
    pub rule_fallbacks: u64,
    pub body_failures: u64,
    pub cycles: u64,
}

impl RuntimeStats {
    /// Share of notified effects that ended up running a body.
    pub fn hit_rate(&self) -> f64 {
        let notified = self.effects_run + self.noop_skips + self.guard_skips + self.rule_fallbacks;
        if notified > 0 { self.effects_run as f64 / notified as f64 } else { 0.0 }
    }
}
