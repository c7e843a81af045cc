//! ONNX Runtime 线程池大小

use ort::session::builder::SessionBuilder;

const DEFAULT_MAX_THREADS: usize = 4;

pub const THREADS_ENV: &str = "REDACTOR_MODEL_THREADS";
pub const INTER_THREADS_ENV: &str = "REDACTOR_MODEL_INTER_THREADS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSettings {
    pub intra: usize,
    pub inter: usize,
}

impl ThreadSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 为 0 或无法解析的覆盖值退回默认值：
    /// 最多四个 intra-op 线程，一个 inter-op 线程。
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let positive = |key: &str| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
        };
        Self {
            intra: positive(THREADS_ENV).unwrap_or_else(default_intra_threads),
            inter: positive(INTER_THREADS_ENV).unwrap_or(1),
        }
    }

    pub fn apply(&self, builder: SessionBuilder) -> Result<SessionBuilder, ort::Error> {
        log::info!("[Model] 线程设置: intra={}, inter={}", self.intra, self.inter);
        builder
            .with_intra_threads(self.intra)?
            .with_inter_threads(self.inter)?
            .with_parallel_execution(false)
    }
}

fn default_intra_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_MAX_THREADS)
        .clamp(1, DEFAULT_MAX_THREADS)
}
