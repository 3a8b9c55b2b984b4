//! 阶段（Stage）与链执行契约。
//!
//! # 教案式导航
//! - **定位（Where）**：请求链与响应链共用的最小处理单元；HTTP 语义由上层 crate 通过类型参数注入。
//! - **动机（Why）**：用标签枚举 [`Continuation`] 取代“可空的下一阶段引用”，使终止与 Abort 分支在
//!   `match` 中被穷尽检查；
//! - **执行（How）**：[`run_chain`] 反复调用当前阶段的 `apply`，沿返回的 `next` 前进，直到遇到终止或 Abort。

use std::{borrow::Cow, fmt, sync::Arc};

use crate::{error::StageError, scope::ScopeInstance};

/// 对象安全的阶段引用，链节点之间以此相连。
pub type StageRef<T, A> = Arc<dyn Stage<T, A>>;

/// 阶段执行后的走向。
///
/// - `Continue`：携带（可能已变换的）载荷与下一阶段；
/// - `Terminal`：链在此结束，载荷即链的结果；
/// - `Abort`：短路剩余阶段，携带替代终态结果（类型可与载荷不同，例如请求链以响应替代）。
pub enum Continuation<T, A> {
    Continue { payload: T, next: StageRef<T, A> },
    Terminal(T),
    Abort(A),
}

impl<T, A> Continuation<T, A> {
    /// 依据是否存在下一阶段，选择 `Continue` 或 `Terminal`。
    pub fn proceed(payload: T, next: Option<StageRef<T, A>>) -> Self {
        match next {
            Some(next) => Continuation::Continue { payload, next },
            None => Continuation::Terminal(payload),
        }
    }
}

impl<T, A> fmt::Debug for Continuation<T, A>
where
    T: 'static,
    A: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Continue { next, .. } => f
                .debug_struct("Continue")
                .field("next", &next.descriptor().label())
                .finish_non_exhaustive(),
            Continuation::Terminal(_) => f.write_str("Terminal(..)"),
            Continuation::Abort(_) => f.write_str("Abort(..)"),
        }
    }
}

/// 描述阶段的元数据，仅用于日志与链路诊断。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageDescriptor {
    label: Cow<'static, str>,
    category: Cow<'static, str>,
}

impl StageDescriptor {
    pub fn new(label: impl Into<Cow<'static, str>>, category: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            category: category.into(),
        }
    }

    /// 匿名描述，常用于测试或快速原型。
    pub fn anonymous(label: impl Into<Cow<'static, str>>) -> Self {
        Self::new(label, "unspecified")
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

/// 阶段契约：`apply(payload) -> (结果载荷, 下一阶段 | 终止) | Abort`。
///
/// # 契约说明（What）
/// - **输入**：`scope` 为当前活跃的作用域实例，阶段可读取或写入作用域绑定；`payload` 按值移交所有权。
/// - **输出**：成功时返回 [`Continuation`]；硬失败返回 [`StageError`]，整条流水线以该原因中止。
/// - **约束**：阶段本身不可变，可在构造时捕获配置，但不得跨调用修改共享状态；实现需 `Send + Sync`，
///   同一阶段会被多个并发请求同时读取。
pub trait Stage<T, A>: Send + Sync + 'static {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::anonymous("stage")
    }

    fn apply(&self, scope: &ScopeInstance, payload: T) -> Result<Continuation<T, A>, StageError>;
}

/// 变换函数的结果：是否继续交给下一环、就地终止或 Abort。
#[derive(Debug)]
pub enum Step<T, A> {
    Next(T),
    Done(T),
    Abort(A),
}

/// 阶段中的“纯变换”半部；下一环链接由 [`ChainBuilder`](crate::ChainBuilder) 显式补齐。
pub trait Transform<T, A>: Send + Sync + 'static {
    fn transform(&self, scope: &ScopeInstance, payload: T) -> Result<Step<T, A>, StageError>;
}

impl<T, A, X> Transform<T, A> for Arc<X>
where
    X: Transform<T, A> + ?Sized,
{
    fn transform(&self, scope: &ScopeInstance, payload: T) -> Result<Step<T, A>, StageError> {
        (**self).transform(scope, payload)
    }
}

/// 闭包形式的 [`Transform`]，由 [`transform_fn`] 构造。
pub struct FnTransform<F> {
    f: F,
}

/// 把闭包包装为 [`Transform`]。
pub fn transform_fn<T, A, F>(f: F) -> FnTransform<F>
where
    F: Fn(&ScopeInstance, T) -> Result<Step<T, A>, StageError> + Send + Sync + 'static,
{
    FnTransform { f }
}

impl<T, A, F> Transform<T, A> for FnTransform<F>
where
    F: Fn(&ScopeInstance, T) -> Result<Step<T, A>, StageError> + Send + Sync + 'static,
{
    fn transform(&self, scope: &ScopeInstance, payload: T) -> Result<Step<T, A>, StageError> {
        (self.f)(scope, payload)
    }
}

/// 恒等阶段：原样返回输入且没有下一阶段。
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl<T, A> Stage<T, A> for Identity {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new("identity", "builtin")
    }

    fn apply(&self, _scope: &ScopeInstance, payload: T) -> Result<Continuation<T, A>, StageError> {
        Ok(Continuation::Terminal(payload))
    }
}

/// 阶段工具集合。
pub struct Stages;

impl Stages {
    /// 恒等链，用于没有任何注册阶段的配置，避免对“空链”做特殊分支。
    pub fn identity<T: 'static, A: 'static>() -> StageRef<T, A> {
        Arc::new(Identity)
    }
}

/// 链执行的终态。
#[derive(Debug)]
pub enum ChainOutcome<T, A> {
    Completed(T),
    Aborted(A),
}

impl<T, A> ChainOutcome<T, A> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, ChainOutcome::Aborted(_))
    }
}

/// 从 `root` 开始驱动链执行到底。
///
/// # 执行逻辑（How）
/// 1. 以 `root` 为当前阶段，调用 `apply`；
/// 2. `Continue` 时替换载荷并前进到 `next`；
/// 3. `Terminal` 返回 [`ChainOutcome::Completed`]，`Abort` 返回 [`ChainOutcome::Aborted`]；
/// 4. 阶段返回的 [`StageError`] 原样向上传播，不做重试。
pub fn run_chain<T, A>(
    scope: &ScopeInstance,
    payload: T,
    root: &StageRef<T, A>,
) -> Result<ChainOutcome<T, A>, StageError>
where
    T: 'static,
    A: 'static,
{
    let mut current = Arc::clone(root);
    let mut payload = payload;
    loop {
        tracing::trace!(
            scope.id = %scope.id(),
            stage = %current.descriptor().label(),
            "applying stage"
        );
        match current.apply(scope, payload)? {
            Continuation::Continue {
                payload: next_payload,
                next,
            } => {
                payload = next_payload;
                current = next;
            }
            Continuation::Terminal(result) => return Ok(ChainOutcome::Completed(result)),
            Continuation::Abort(substitute) => {
                tracing::debug!(
                    scope.id = %scope.id(),
                    stage = %current.descriptor().label(),
                    "chain aborted by stage"
                );
                return Ok(ChainOutcome::Aborted(substitute));
            }
        }
    }
}
