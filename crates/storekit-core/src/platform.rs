//! Small shims that paper over differences between native targets and `wasm32`.
//!
//! Browser handles (`JsValue` and friends) are neither `Send` nor `Sync`, so on `wasm32` the
//! thread-safety bounds used on native targets are dropped. Timers and detached tasks also need
//! different primitives: native targets use Tokio, the browser uses `setTimeout` and
//! `spawn_local`, and `std::time::SystemTime::now()` panics on `wasm32-unknown-unknown`.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `Send + Sync` on native targets, no bound on `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSendSync: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync + ?Sized> MaybeSendSync for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSendSync {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSendSync for T {}

/// Current wall-clock time as a `std::time::SystemTime`.
pub fn now() -> SystemTime {
    let since_epoch = web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .unwrap_or_default();
    UNIX_EPOCH + since_epoch
}

/// Run `fut` to completion without tying it to the caller.
///
/// Native targets spawn onto the ambient Tokio runtime. Outside a runtime the task is dropped
/// with a warning; callers only use this for best-effort work.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(name: &str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        Err(err) => {
            tracing::warn!(task = name, error = %err, "no async runtime; skipping detached task");
        }
    }
}

/// Run `fut` to completion without tying it to the caller.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(_name: &str, fut: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(fut);
}

/// Resolve after `duration` has elapsed. Native targets need a Tokio runtime with timers enabled.
#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Resolve after `duration` has elapsed.
#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    use wasm_bindgen::{JsCast, JsValue};

    let millis = duration.as_millis().min(i32::MAX as u128) as i32;
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let global = js_sys::global();
        let set_timeout = js_sys::Reflect::get(&global, &JsValue::from_str("setTimeout"))
            .ok()
            .and_then(|f| f.dyn_into::<js_sys::Function>().ok());
        if let Some(set_timeout) = set_timeout {
            let _ = set_timeout.call2(&global, &resolve, &JsValue::from(millis));
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}

/// Await `fut`, giving up once `timeout` elapses. `None` waits forever.
///
/// Returns `None` if the deadline passed first.
#[cfg(not(target_arch = "wasm32"))]
pub async fn with_deadline<F>(fut: F, timeout: Option<Duration>) -> Option<F::Output>
where
    F: Future,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Await `fut`, giving up once `timeout` elapses. `None` waits forever.
///
/// Returns `None` if the deadline passed first.
#[cfg(target_arch = "wasm32")]
pub async fn with_deadline<F>(fut: F, timeout: Option<Duration>) -> Option<F::Output>
where
    F: Future,
{
        let Some(timeout) = timeout else {
        return Some(fut.await);
    };

    let fut = std::pin::pin!(fut);
    let timer = std::pin::pin!(sleep(timeout));
    match select(fut, timer).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(((), _)) => None,
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_epoch() {
        assert!(now() > UNIX_EPOCH);
    }

    #[tokio::test]
    async fn deadline_lets_fast_futures_through() {
        let out = with_deadline(async { 7 }, Some(Duration::from_secs(5))).await;
        assert_eq!(out, Some(7));
    }

    #[tokio::test]
    async fn deadline_cuts_off_pending_futures() {
        let out = with_deadline(
            futures::future::pending::<()>(),
            Some(Duration::from_millis(20)),
        )
        .await;
        assert_eq!(out, None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn deadline_follows_the_runtime_clock() {
        tokio::time::pause();

        let handle = tokio::spawn(with_deadline(
            tokio::time::sleep(Duration::from_secs(10)),
            Some(Duration::from_secs(1)),
        ));
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(handle.await.unwrap(), None);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "current_thread")]
    async fn deadlines_do_not_start_threads() {
        fn live_threads() -> usize {
            std::fs::read_dir("/proc/self/task").unwrap().count()
        }

        let before = live_threads();
        for i in 0..200 {
            let (tx, rx) = futures::channel::oneshot::channel();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                let _ = tx.send(i);
            });
            let out = with_deadline(rx, Some(Duration::from_secs(30))).await;
            assert_eq!(out, Some(Ok(i)));
        }
        // Slack for test harness threads coming and going in parallel.
        let after = live_threads();
        assert!(after < before + 16, "{after} threads after, {before} before");
    }

    #[tokio::test]
    async fn detached_tasks_run() {
        let (tx, rx) = futures::channel::oneshot::channel();
        spawn_detached("detached-test", async move {
            let _ = tx.send(5);
        });
        assert_eq!(rx.await.unwrap(), 5);
    }

    #[test]
    fn detached_tasks_outside_a_runtime_are_skipped() {
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&ran);
        spawn_detached("detached-test", async move {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
