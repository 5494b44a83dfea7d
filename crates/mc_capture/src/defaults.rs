// Tick defaults
pub fn default_fps() -> u32 {
    25 // 40 ms tick
}

pub fn min_fps() -> u32 {
    10
}

// Liveness defaults
pub fn default_liveness_timeout_ms() -> u64 {
    200
}

// Worker thread defaults
pub fn default_thread_name() -> String {
    "mc-capture-worker".to_string()
}
