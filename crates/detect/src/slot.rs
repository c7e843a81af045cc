//! 延迟（或立即）初始化的共享检测模型

use std::sync::OnceLock;

use crate::error::DetectError;
use crate::model::SignatureModel;

pub type BoxedModel = Box<dyn SignatureModel>;
pub type ModelLoader = Box<dyn Fn() -> Result<BoxedModel, DetectError> + Send + Sync>;

/// 模型加载失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPolicy {
    /// 构造时加载并返回错误
    FailFast,
    /// 首次使用时加载；失败后本进程内禁用检测
    FailSoft,
}

/// 最多持有一个模型实例。并发首次使用时也只初始化一次。
pub struct ModelSlot {
    loader: Option<ModelLoader>,
    cell: OnceLock<Option<BoxedModel>>,
    policy: InitPolicy,
}

impl ModelSlot {
    /// 推迟到第一次 [`ModelSlot::get`] 时加载
    pub fn lazy(loader: ModelLoader) -> Self {
        Self {
            loader: Some(loader),
            cell: OnceLock::new(),
            policy: InitPolicy::FailSoft,
        }
    }

    /// 立即加载
    pub fn eager(loader: ModelLoader) -> Result<Self, DetectError> {
        let model = loader()?;
        let cell = OnceLock::new();
        let _ = cell.set(Some(model));
        Ok(Self {
            loader: None,
            cell,
            policy: InitPolicy::FailFast,
        })
    }

    pub fn new(loader: ModelLoader, policy: InitPolicy) -> Result<Self, DetectError> {
        match policy {
            InitPolicy::FailFast => Self::eager(loader),
            InitPolicy::FailSoft => Ok(Self::lazy(loader)),
        }
    }

    /// 返回模型；无法加载时为 `None`
    pub fn get(&self) -> Option<&dyn SignatureModel> {
        self.cell
            .get_or_init(|| {
                let loader = self.loader.as_ref()?;
                match loader() {
                    Ok(model) => Some(model),
                    Err(e) => {
                        log::error!("[Model] 签名模型不可用: {}", e);
                        None
                    }
                }
            })
            .as_deref()
    }

    pub fn is_available(&self) -> bool {
        self.get().is_some()
    }

    pub fn policy(&self) -> InitPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoredBox;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NullModel;

    impl SignatureModel for NullModel {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<ScoredBox>, DetectError> {
            Ok(Vec::new())
        }
    }

    fn counting_loader(calls: Arc<AtomicUsize>, ok: bool) -> ModelLoader {
        Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            if ok {
                Ok(Box::new(NullModel) as BoxedModel)
            } else {
                Err(DetectError::ModelLoad("missing".into()))
            }
        })
    }

    #[test]
    fn test_lazy_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slot = ModelSlot::lazy(counting_loader(calls.clone(), true));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(slot.is_available());
        assert!(slot.get().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_failure_is_sticky() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slot = ModelSlot::lazy(counting_loader(calls.clone(), false));
        assert!(slot.get().is_none());
        assert!(slot.get().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(ModelSlot::lazy(counting_loader(calls.clone(), true)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = slot.clone();
                std::thread::spawn(move || slot.is_available())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eager_reports_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(ModelSlot::eager(counting_loader(calls.clone(), false)).is_err());

        let slot = ModelSlot::new(counting_loader(calls.clone(), true), InitPolicy::FailFast)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(slot.is_available());
        assert_eq!(slot.policy(), InitPolicy::FailFast);
    }
}
