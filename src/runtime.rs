// Threading models and per-thread library state.
//
// Each thread owns a heap (single/async modes) or shares one with the other
// members of its group (shared mode). Every public operation acquires the
// heap for its whole duration, which doubles as the implicit pause the
// engines need: a collection can only start between operations. The
// asynchronous modes run collections on a dedicated worker thread; the
// pause/resume contract becomes a message pair on a channel.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};
use lazy_static::lazy_static;
use threadpool::ThreadPool;

use crate::error::ErrorLevel;
use crate::gc;
use crate::pages::Heap;

/// Threading model, chosen once per thread at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One thread, synchronous collections.
    Single,
    /// One thread plus a dedicated GC worker.
    Async,
    /// Several threads sharing one heap, identified by a group number; a
    /// dedicated worker collects when no member is paused.
    Shared(usize),
}

enum WorkerMsg {
    Collect,
    Shutdown,
}

struct ThreadCtx {
    mode: Mode,
    heap: Arc<Mutex<Heap>>,
    collect_tx: Option<Sender<WorkerMsg>>,
    pool: Option<ThreadPool>,
}

struct GroupEntry {
    heap: Arc<Mutex<Heap>>,
    tx: Sender<WorkerMsg>,
    pool: ThreadPool,
    members: usize,
}

lazy_static! {
    static ref GROUPS: Mutex<HashMap<usize, GroupEntry>> = Mutex::new(HashMap::new());
}

thread_local! {
    static CTX: RefCell<Option<ThreadCtx>> = RefCell::new(None);
}

fn worker_loop(heap: Arc<Mutex<Heap>>, rx: Receiver<WorkerMsg>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            WorkerMsg::Collect => {
                let mut h = heap.lock().unwrap();
                if h.user_paused > 0 {
                    // A mutator holds a pause; the matching resume will
                    // signal again.
                    h.gc_pending = true;
                } else if h.gc_pending {
                    gc::collect(&mut h);
                }
            }
            WorkerMsg::Shutdown => break,
        }
    }
}

fn spawn_worker(heap: Arc<Mutex<Heap>>) -> (Sender<WorkerMsg>, ThreadPool) {
    let (tx, rx) = unbounded();
    let pool = ThreadPool::new(1);
    pool.execute(move || worker_loop(heap, rx));
    (tx, pool)
}

/// Initialize the library on the calling thread. Double initialization is an
/// error.
pub fn init(mode: Mode) {
    CTX.with(|c| {
        if c.borrow().is_some() {
            col_error!(ErrorLevel::Error, "thread already initialized");
            return;
        }
        let ctx = match mode {
            Mode::Single => ThreadCtx {
                mode,
                heap: Arc::new(Mutex::new(Heap::new())),
                collect_tx: None,
                pool: None,
            },
            Mode::Async => {
                let heap = Arc::new(Mutex::new(Heap::new()));
                let (tx, pool) = spawn_worker(heap.clone());
                ThreadCtx {
                    mode,
                    heap,
                    collect_tx: Some(tx),
                    pool: Some(pool),
                }
            }
            Mode::Shared(group) => {
                let mut groups = GROUPS.lock().unwrap();
                let entry = groups.entry(group).or_insert_with(|| {
                    let heap = Arc::new(Mutex::new(Heap::new()));
                    let (tx, pool) = spawn_worker(heap.clone());
                    GroupEntry {
                        heap,
                        tx,
                        pool,
                        members: 0,
                    }
                });
                entry.members += 1;
                ThreadCtx {
                    mode,
                    heap: entry.heap.clone(),
                    collect_tx: Some(entry.tx.clone()),
                    pool: None,
                }
            }
        };
        *c.borrow_mut() = Some(ctx);
    })
}

/// Tear down the calling thread's library state. Must match a prior `init`
/// on the same thread.
pub fn cleanup() {
    CTX.with(|c| {
        let ctx = match c.borrow_mut().take() {
            Some(ctx) => ctx,
            None => {
                col_error!(ErrorLevel::Error, "cleanup without matching init");
                return;
            }
        };
        match ctx.mode {
            Mode::Single => {}
            Mode::Async => {
                if let Some(tx) = &ctx.collect_tx {
                    let _ = tx.send(WorkerMsg::Shutdown);
                }
                if let Some(pool) = &ctx.pool {
                    pool.join();
                }
            }
            Mode::Shared(group) => {
                let mut groups = GROUPS.lock().unwrap();
                let last = match groups.get_mut(&group) {
                    Some(entry) => {
                        entry.members -= 1;
                        entry.members == 0
                    }
                    None => false,
                };
                if last {
                    if let Some(entry) = groups.remove(&group) {
                        let _ = entry.tx.send(WorkerMsg::Shutdown);
                        entry.pool.join();
                    }
                }
            }
        }
    })
}

/// Whether `init` has run on this thread.
pub fn initialized() -> bool {
    CTX.with(|c| c.borrow().is_some())
}

/// Run `f` against the calling thread's heap. Holding the heap for the whole
/// operation is what keeps a collection from observing intermediate cell
/// states; on the way out, a scheduled collection is run (single mode) or
/// signalled to the worker.
pub(crate) fn with_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> Option<R> {
    CTX.with(|c| {
        let ctx_ref = c.borrow();
        let ctx = match ctx_ref.as_ref() {
            Some(ctx) => ctx,
            None => {
                col_error!(ErrorLevel::Error, "library not initialized on this thread");
                return None;
            }
        };
        let mut signal = false;
        let r = {
            let mut h = ctx.heap.lock().unwrap();
            let r = f(&mut h);
            if h.gc_pending && h.user_paused == 0 {
                match ctx.mode {
                    Mode::Single => gc::collect(&mut h),
                    _ => signal = true,
                }
            }
            r
        };
        if signal {
            if let Some(tx) = &ctx.collect_tx {
                let _ = tx.send(WorkerMsg::Collect);
            }
        }
        Some(r)
    })
}

/// Suspend garbage collection until the matching `resume_gc`. Pauses nest.
pub fn pause_gc() {
    with_heap(|h| {
        h.user_paused += 1;
    });
}

/// Attempt to pause without blocking; fails when a collection is running on
/// the worker thread.
pub fn try_pause_gc() -> bool {
    CTX.with(|c| {
        let ctx_ref = c.borrow();
        let ctx = match ctx_ref.as_ref() {
            Some(ctx) => ctx,
            None => {
                col_error!(ErrorLevel::Error, "library not initialized on this thread");
                return false;
            }
        };
        let result = match ctx.heap.try_lock() {
            Ok(mut h) => {
                h.user_paused += 1;
                true
            }
            Err(_) => false,
        };
        result
    })
}

/// Re-enable garbage collection. This is one of the two points where a
/// scheduled collection may start.
pub fn resume_gc() {
    with_heap(|h| {
        if h.user_paused == 0 {
            col_error!(ErrorLevel::Error, "resume_gc without matching pause_gc");
        } else {
            h.user_paused -= 1;
        }
    });
}

/// Snapshot of collection statistics for the calling thread's heap.
pub fn gc_stats() -> Option<gc::GcStats> {
    with_heap(|h| h.stats)
}
