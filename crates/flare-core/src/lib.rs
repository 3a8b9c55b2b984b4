#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "flare-core: 客户端请求/响应处理运行时的核心契约。"]
#![doc = ""]
#![doc = "== 模块地图 =="]
#![doc = "- `stage` / `chain`：以 `Continuation` 标签枚举表达的阶段链，以及保持注册顺序的链构建器；"]
#![doc = "- `scope`：显式传递、引用计数的请求作用域实例，跨线程共享同一组作用域绑定；"]
#![doc = "- `lifecycle`：`Open → Closed` 单向状态机与一次性监听器排空；"]
#![doc = "- `executor`：请求侧/响应侧两种执行器角色共用的最小调度契约与线程池实现。"]
#![doc = ""]
#![doc = "== 依赖约束 =="]
#![doc = "本 crate 不感知 HTTP 语义，也不绑定任何异步运行时；`runtime-tokio` Feature 仅额外提供 Tokio 执行器适配。"]

pub mod chain;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod scope;
pub mod stage;

pub use chain::ChainBuilder;
pub use error::{BoxError, ChainError, ExecutorError, LifecycleError, StageError};
pub use executor::{Executor, ExecutorRef, InlineExecutor, RejectedTask, Task, ThreadPoolExecutor};
#[cfg(feature = "runtime-tokio")]
pub use executor::TokioExecutor;
pub use lifecycle::{LifecycleListener, LifecycleRegistry};
pub use scope::{RequestScope, ScopeId, ScopeInstance, ScopeProbe};
pub use stage::{
    ChainOutcome, Continuation, Stage, StageDescriptor, StageRef, Stages, Step, Transform,
    run_chain, transform_fn,
};
