//! # signal_kit
//!
//! A small push-based signal library. A [`Signal`] broadcasts the values it is
//! sent to a dynamic set of observers, operators derive new Signals from it,
//! and lifetimes are controlled through explicit [`Disposable`]s rather than
//! through any host runtime.
//!
//! ```
//! use signal_kit::{DisposableBag, DisposeWith, Signal};
//!
//! let bag = DisposableBag::new();
//! let year = Signal::<i32>::new();
//!
//! year.map(|year| year.to_string())
//!     .next(|text| assert_eq!(text, "2016"))
//!     .dispose_with(&bag);
//!
//! year.send_next(2016);
//! ```

mod bag;
mod disposable;
mod error;
mod event;
mod operators;
mod scheduler;
mod signal;

pub use bag::{Bag, Token};
pub use disposable::{ActionDisposable, Disposable, DisposableBag, DisposeWith};
pub use error::ScheduleError;
pub use event::{EventCallback, EventObserver, EventSource};
pub use scheduler::{Queue, Scheduler, TimerToken};
pub use signal::{ObserverHandle, Signal};
