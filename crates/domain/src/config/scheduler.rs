use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Path to the cron job store file (atomic JSON persistence).
    #[serde(default = "d_store_path")]
    pub store_path: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            store_path: d_store_path(),
        }
    }
}

fn d_store_path() -> String {
    "./data/cron.json".into()
}
