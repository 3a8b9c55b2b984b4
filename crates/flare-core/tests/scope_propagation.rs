//! 作用域实例跨线程传播与引用计数。

use std::{sync::Arc, thread};

use flare_core::{Executor, RequestScope, ThreadPoolExecutor};

#[derive(Debug, PartialEq)]
struct CurrentUser(&'static str);

/// 请求侧线程写入的绑定，在响应侧线程上以同一实例可见；两侧都释放后实例才拆除。
#[test]
fn bindings_cross_an_executor_hop() {
    let scope = RequestScope::new();
    let instance = scope.create_instance();
    let probe = instance.probe();
    instance.bind(CurrentUser("alice"));

    let pool = ThreadPoolExecutor::new("scope-hop", 2).expect("线程池应创建成功");
    let (tx, rx) = crossbeam_channel::bounded(1);
    let hop = instance.reference();
    pool.execute(Box::new(move || {
        let seen = hop.get::<CurrentUser>();
        hop.release();
        tx.send(seen).unwrap();
    }))
    .expect("运行中的池应接收任务");

    let seen = rx.recv().expect("任务应回传结果");
    assert_eq!(seen.as_deref(), Some(&CurrentUser("alice")));
    assert!(!probe.is_released(), "创建者的引用仍在");

    instance.release();
    assert!(probe.is_released());
    assert_eq!(scope.active_instances(), 0);
}

/// 多线程各自持有引用并以任意次序释放，拆除恰发生一次。
#[test]
fn concurrent_release_tears_down_once() {
    let scope = RequestScope::new();
    let instance = scope.create_instance();
    let probe = instance.probe();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let reference = instance.reference();
            thread::spawn(move || {
                assert!(reference.outstanding_references() >= 1);
                reference.release();
            })
        })
        .collect();
    instance.release();
    for handle in handles {
        handle.join().expect("释放线程不应 panic");
    }

    assert!(probe.is_released());
    assert_eq!(probe.outstanding_references(), 0);
    assert_eq!(scope.active_instances(), 0);
}

/// 绑定值在拆除后仍可被已取出的 `Arc` 持有者使用。
#[test]
fn extracted_binding_outlives_teardown() {
    let scope = RequestScope::new();
    let user = scope.run_in_new_scope(|instance| {
        instance.bind(CurrentUser("bob"));
        instance.get::<CurrentUser>()
    });
    let user: Arc<CurrentUser> = user.expect("绑定应存在");
    assert_eq!(*user, CurrentUser("bob"));
    assert_eq!(scope.active_instances(), 0);
}
