//! Game-thread task queue
//!
//! Uses crossbeam-channel for lock-free MPSC submission from connection
//! handlers to the single thread that owns the `GameContext`. Tasks run
//! strictly in submission order; there is no priority and no cancellation.
//! A task whose target has gone away is expected to notice and do nothing.

use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info};

use crate::game::context::GameContext;

/// Deferred continuation executed on the game thread
pub type Task = Box<dyn FnOnce(&mut GameContext) + Send>;

/// Create a connected sender/queue pair
pub fn task_queue() -> (TaskSender, TaskQueue) {
    let (sender, receiver) = unbounded();
    (TaskSender { sender }, TaskQueue { receiver })
}

/// Submission handle, cloned into every connection
#[derive(Clone)]
pub struct TaskSender {
    sender: Sender<Task>,
}

impl TaskSender {
    /// Queue a task. Returns false once the game thread has stopped.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut GameContext) + Send + 'static,
    {
        self.sender.send(Box::new(task)).is_ok()
    }
}

/// Receiving end, owned by whoever runs the game thread
pub struct TaskQueue {
    receiver: Receiver<Task>,
}

impl TaskQueue {
    /// Run every task queued so far, in order. Tasks submitted while
    /// draining are picked up in the same call.
    pub fn run_pending(&self, ctx: &mut GameContext) -> usize {
        let mut executed = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task(ctx);
            executed += 1;
        }
        executed
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Block on the queue until every sender is gone
    pub fn run(self, ctx: &mut GameContext) {
        for task in self.receiver.iter() {
            task(ctx);
        }
        debug!("Task queue closed");
    }
}

/// Start the game thread. The context is built on that thread because it
/// holds thread-local shared handles.
pub fn spawn_game_thread<F>(queue: TaskQueue, build: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() -> GameContext + Send + 'static,
{
    std::thread::Builder::new()
        .name("game".to_string())
        .spawn(move || {
            let mut ctx = build();
            info!("Game thread started");
            queue.run(&mut ctx);
            info!("Game thread stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::context::GameContext;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_tasks_run_in_submission_order() {
        let (sender, queue) = task_queue();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = seen.clone();
            sender.submit(move |_ctx| seen.lock().unwrap().push(i));
        }
        assert_eq!(queue.pending_count(), 5);

        let mut ctx = GameContext::for_tests();
        assert_eq!(queue.run_pending(&mut ctx), 5);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_submit_fails_after_queue_dropped() {
        let (sender, queue) = task_queue();
        drop(queue);
        assert!(!sender.submit(|_ctx| {}));
    }

    #[test]
    fn test_game_thread_drains_until_senders_gone() {
        let (sender, queue) = task_queue();
        let seen = Arc::new(Mutex::new(0));

        let handle = spawn_game_thread(queue, GameContext::for_tests).unwrap();
        for _ in 0..10 {
            let seen = seen.clone();
            sender.submit(move |_ctx| *seen.lock().unwrap() += 1);
        }
        drop(sender);
        handle.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), 10);
    }
}
