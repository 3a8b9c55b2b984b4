//! 请求作用域：显式传递、引用计数的上下文容器。
//!
//! # 教案式导航
//! - **动机（Why）**：请求侧阶段与响应侧回调经常运行在不同线程上，却需要观察同一组“当前请求 / 当前配置”绑定。
//!   本模块不依赖线程局部存储，而是把 [`ScopeInstance`] 作为显式参数随每个任务一起移交。
//! - **契约（What）**：
//!   - 每个句柄恰好释放一次：`release(self)` 消费句柄，未显式释放的句柄在 `Drop` 时兜底释放（含 panic 路径）；
//!   - 实例在引用计数归零时拆除一次，清空绑定并从管理器的活跃计数中扣除；
//!   - 多个线程可同时持有同一实例的不同句柄，拆除时机由计数而非“所有者”决定。
//! - **取舍（Trade-offs）**：绑定表使用 `parking_lot::RwLock`，读多写少；绑定值以 `Arc` 共享，
//!   取出后即使实例已拆除也仍然有效。

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use parking_lot::RwLock;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

type Binding = Arc<dyn Any + Send + Sync>;

/// 作用域实例标识，进程内单调递增，用于日志关联。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct ScopeRegistry {
    live: AtomicUsize,
    created: AtomicU64,
}

struct ScopeState {
    id: ScopeId,
    refs: AtomicUsize,
    released: AtomicBool,
    bindings: RwLock<HashMap<TypeId, Binding>>,
    registry: Arc<ScopeRegistry>,
}

impl ScopeState {
    fn teardown(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        // 先移出再析构，绑定值的 Drop 可能回头访问本实例。
        let bindings = std::mem::take(&mut *self.bindings.write());
        drop(bindings);
        self.registry.live.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!(scope.id = %self.id, "scope instance released");
    }
}

/// 请求作用域管理器。
///
/// 克隆代价为一次 `Arc` 计数；所有克隆共享同一份活跃实例统计。
#[derive(Clone, Debug, Default)]
pub struct RequestScope {
    registry: Arc<ScopeRegistry>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建新实例，返回的句柄持有一次引用。
    pub fn create_instance(&self) -> ScopeInstance {
        let id = ScopeId::next();
        self.registry.live.fetch_add(1, Ordering::AcqRel);
        self.registry.created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(scope.id = %id, "scope instance created");
        ScopeInstance {
            state: Arc::new(ScopeState {
                id,
                refs: AtomicUsize::new(1),
                released: AtomicBool::new(false),
                bindings: RwLock::new(HashMap::new()),
                registry: Arc::clone(&self.registry),
            }),
            released: false,
        }
    }

    /// 在给定实例中执行任务。
    ///
    /// 任务执行期间额外持有一次引用，任务返回或 panic 时该引用都会被释放，
    /// 因此调用方即使在任务内部释放了自己的句柄，实例也不会在任务结束前被拆除。
    pub fn run_in_scope<R>(&self, instance: &ScopeInstance, task: impl FnOnce(&ScopeInstance) -> R) -> R {
        let active = instance.reference();
        task(&active)
    }

    /// 以临时实例执行任务，任务结束后释放该实例。
    pub fn run_in_new_scope<R>(&self, task: impl FnOnce(&ScopeInstance) -> R) -> R {
        let instance = self.create_instance();
        task(&instance)
    }

    /// 尚未拆除的实例数量。
    pub fn active_instances(&self) -> usize {
        self.registry.live.load(Ordering::Acquire)
    }

    /// 累计创建的实例数量。
    pub fn created_instances(&self) -> u64 {
        self.registry.created.load(Ordering::Relaxed)
    }
}

/// 作用域实例句柄。
///
/// # 教案级说明
/// - **意图 (Why)**：句柄是“引用”的所有权化身：持有即计数，释放即减计数。把计数绑在值的生命周期上，
///   任何退出路径（正常、Abort、失败、panic）都不会漏释放或多释放。
/// - **契约 (What)**：
///   - [`Self::reference`] 对应 “referenceCurrent”：计数加一并返回新句柄；
///   - [`Self::release`] 消费句柄；`Drop` 对未释放的句柄兜底；
///   - [`Self::bind`] / [`Self::get`] 读写跨线程共享的类型化绑定。
/// - **风险 (Trade-offs)**：句柄不实现 `Clone`，以免隐式复制造成计数语义模糊；需要第二个引用时显式调用 `reference`。
pub struct ScopeInstance {
    state: Arc<ScopeState>,
    released: bool,
}

impl ScopeInstance {
    pub fn id(&self) -> ScopeId {
        self.state.id
    }

    /// 增加一次引用并返回新句柄。
    pub fn reference(&self) -> ScopeInstance {
        self.state.refs.fetch_add(1, Ordering::AcqRel);
        ScopeInstance {
            state: Arc::clone(&self.state),
            released: false,
        }
    }

    /// 释放本句柄持有的引用。
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.state.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.teardown();
        }
    }

    /// 绑定一个值，返回同类型的旧值。
    pub fn bind<T>(&self, value: T) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.bind_arc(Arc::new(value))
    }

    pub fn bind_arc<T>(&self, value: Arc<T>) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.state
            .bindings
            .write()
            .insert(TypeId::of::<T>(), value)
            .and_then(|previous| previous.downcast::<T>().ok())
    }

    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.state
            .bindings
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn contains<T>(&self) -> bool
    where
        T: Any + Send + Sync,
    {
        self.state.bindings.read().contains_key(&TypeId::of::<T>())
    }

    /// 当前所有句柄合计的未释放引用数。
    pub fn outstanding_references(&self) -> usize {
        self.state.refs.load(Ordering::Acquire)
    }

    /// 返回不持有引用的观察者。
    pub fn probe(&self) -> ScopeProbe {
        ScopeProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for ScopeInstance {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for ScopeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeInstance")
            .field("id", &self.state.id)
            .field("refs", &self.outstanding_references())
            .finish()
    }
}

/// 作用域实例的只读观察者，不参与引用计数。
#[derive(Clone)]
pub struct ScopeProbe {
    state: Arc<ScopeState>,
}

impl ScopeProbe {
    pub fn id(&self) -> ScopeId {
        self.state.id
    }

    pub fn outstanding_references(&self) -> usize {
        self.state.refs.load(Ordering::Acquire)
    }

    /// 实例是否已经拆除。
    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ScopeProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeProbe")
            .field("id", &self.state.id)
            .field("refs", &self.outstanding_references())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    #[derive(Debug, PartialEq)]
    struct Tenant(&'static str);

    #[test]
    fn teardown_happens_when_last_reference_is_released() {
        let scope = RequestScope::new();
        let instance = scope.create_instance();
        let probe = instance.probe();
        let second = instance.reference();
        assert_eq!(probe.outstanding_references(), 2);

        instance.release();
        assert!(!probe.is_released(), "仍有引用时不应拆除");
        assert_eq!(scope.active_instances(), 1);

        drop(second);
        assert!(probe.is_released());
        assert_eq!(probe.outstanding_references(), 0);
        assert_eq!(scope.active_instances(), 0);
    }

    #[test]
    fn bindings_are_shared_by_all_handles() {
        let scope = RequestScope::new();
        let instance = scope.create_instance();
        let other = instance.reference();
        instance.bind(Tenant("acme"));
        assert_eq!(other.get::<Tenant>().as_deref(), Some(&Tenant("acme")));

        let previous = other.bind(Tenant("globex")).expect("应返回旧值");
        assert_eq!(*previous, Tenant("acme"));
        assert_eq!(instance.get::<Tenant>().as_deref(), Some(&Tenant("globex")));
    }

    #[test]
    fn run_in_new_scope_releases_after_task() {
        let scope = RequestScope::new();
        let probe = scope.run_in_new_scope(|instance| {
            assert_eq!(instance.outstanding_references(), 1);
            instance.probe()
        });
        assert!(probe.is_released());
        assert_eq!(scope.active_instances(), 0);
        assert_eq!(scope.created_instances(), 1);
    }

    #[test]
    fn panicking_task_still_releases_its_reference() {
        let scope = RequestScope::new();
        let instance = scope.create_instance();
        let probe = instance.probe();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: () = scope.run_in_scope(&instance, |_| panic!("stage exploded"));
        }));
        assert!(outcome.is_err());
        assert_eq!(probe.outstanding_references(), 1, "panic 后只剩创建者的引用");
        drop(instance);
        assert!(probe.is_released());
    }
}
