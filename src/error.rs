use crate::scheduler::Queue;

/// Failure to hand work to a queue executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("the {} queue is not accepting work", .0.label())]
    QueueUnavailable(Queue),
}
