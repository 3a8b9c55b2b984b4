//! 阶段链构建：把按注册顺序排列的变换链接成单个根阶段。
//!
//! # 教案式导航
//! - **结构（What）**：每个节点是一个纯变换加上一条显式的 `next` 链接；最后一个节点的 `next` 为空，
//!   `Step::Next` 在此处自然转为 `Continuation::Terminal`；
//! - **构建期校验（How）**：同一个变换实例注册两次会让链条自指，注册时即以 [`ChainError::DuplicateStage`] 拒绝，
//!   运行期不再需要环检测；
//! - **空链**：没有任何条目时 `build()` 返回恒等阶段。

use std::{borrow::Cow, sync::Arc};

use crate::{
    error::{ChainError, StageError},
    scope::ScopeInstance,
    stage::{Continuation, Stage, StageDescriptor, StageRef, Stages, Step, Transform, transform_fn},
};

/// 链节点：一个纯变换加上一条显式的 `next` 链接。
struct Linked<T, A> {
    descriptor: StageDescriptor,
    transform: Arc<dyn Transform<T, A>>,
    next: Option<StageRef<T, A>>,
}

impl<T, A> Stage<T, A> for Linked<T, A>
where
    T: 'static,
    A: 'static,
{
    fn descriptor(&self) -> StageDescriptor {
        self.descriptor.clone()
    }

    fn apply(&self, scope: &ScopeInstance, payload: T) -> Result<Continuation<T, A>, StageError> {
        match self.transform.transform(scope, payload)? {
            Step::Next(payload) => Ok(Continuation::proceed(payload, self.next.clone())),
            Step::Done(payload) => Ok(Continuation::Terminal(payload)),
            Step::Abort(substitute) => Ok(Continuation::Abort(substitute)),
        }
    }
}

/// `ChainBuilder` 把有序的变换列表组合成单个根阶段。
///
/// # 教案级说明
///
/// ## 意图 (Why)
/// - 运行时只持有“根阶段”一个入口，链的长度与构成对执行循环透明；
/// - 构建顺序即执行顺序。本层不做优先级重排，优先级在上游装配注册表时已经决定。
///
/// ## 解析逻辑 (How)
/// - `register`/`stage` 按调用顺序追加条目；
/// - `build` 从尾部向前折叠：每个节点持有已构建好的后继，因此链天然单向且无环；
/// - 同一个 `Arc` 实例再次注册会被识别为环并在构建期拒绝（见 [`ChainError::DuplicateStage`]）。
///
/// ## 契约 (What)
/// - 空构建器 `build()` 得到恒等链；
/// - `build_onto(tail)` 把最后一个节点连接到既有的 `tail` 根阶段上。
pub struct ChainBuilder<T, A> {
    entries: Vec<(StageDescriptor, Arc<dyn Transform<T, A>>)>,
}

impl<T, A> Default for ChainBuilder<T, A> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T, A> ChainBuilder<T, A>
where
    T: 'static,
    A: 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个共享的变换实例；同一实例重复注册返回 [`ChainError::DuplicateStage`]。
    pub fn register(
        &mut self,
        descriptor: StageDescriptor,
        transform: Arc<dyn Transform<T, A>>,
    ) -> Result<&mut Self, ChainError> {
        let candidate = Arc::as_ptr(&transform) as *const ();
        if self
            .entries
            .iter()
            .any(|(_, existing)| Arc::as_ptr(existing) as *const () == candidate)
        {
            return Err(ChainError::DuplicateStage {
                label: descriptor.label().to_owned(),
            });
        }
        self.entries.push((descriptor, transform));
        Ok(self)
    }

    /// 以新建实例追加变换；新实例不可能与已有条目重复。
    pub fn stage(
        mut self,
        label: impl Into<Cow<'static, str>>,
        transform: impl Transform<T, A>,
    ) -> Self {
        self.entries
            .push((StageDescriptor::anonymous(label), Arc::new(transform)));
        self
    }

    /// 以闭包追加变换。
    pub fn stage_fn<F>(self, label: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(&ScopeInstance, T) -> Result<Step<T, A>, StageError> + Send + Sync + 'static,
    {
        self.stage(label, transform_fn(f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 构建根阶段；空构建器得到恒等链。
    pub fn build(self) -> StageRef<T, A> {
        self.link(None).unwrap_or_else(Stages::identity)
    }

    /// 构建并把最后一个节点接到 `tail`；空构建器直接返回 `tail`。
    pub fn build_onto(self, tail: StageRef<T, A>) -> StageRef<T, A> {
        let fallback = Arc::clone(&tail);
        self.link(Some(tail)).unwrap_or(fallback)
    }

    fn link(self, tail: Option<StageRef<T, A>>) -> Option<StageRef<T, A>> {
        let mut next = tail;
        let mut linked_any = false;
        for (descriptor, transform) in self.entries.into_iter().rev() {
            let node: StageRef<T, A> = Arc::new(Linked {
                descriptor,
                transform,
                next,
            });
            next = Some(node);
            linked_any = true;
        }
        if linked_any { next } else { None }
    }
}
