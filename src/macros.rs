//! Macros for waiting on the transceiver


/// Polls a non-blocking operation until it completes or a deadline passes
///
/// Takes a timer implementing `embedded_hal::timer::CountDown`, which must
/// already be running, and an expression of type `nb::Result<T, E>`. The
/// expression is evaluated over and over for as long as it returns
/// `WouldBlock`. Between evaluations, the timer is checked.
///
/// Evaluates to `Result<T, TimeoutError<E>>`. The operation is always tried
/// at least once, so a result that is already available is returned even if
/// the timer has expired.
///
/// A ranging cycle waits on one timer at every poll point, so the time limit
/// covers the cycle as a whole.
///
/// # Example
///
/// ``` rust
/// use dw1000_ds_twr_tag::{
///     macros::TimeoutError,
///     block_timeout,
/// };
/// #
/// # struct Expired;
/// #
/// # impl embedded_hal::timer::CountDown for Expired {
/// #     type Time = ();
/// #     fn start<T>(&mut self, _: T) {}
/// #     fn wait(&mut self) -> nb::Result<(), void::Void> { Ok(()) }
/// # }
/// #
/// # let mut timer = Expired;
///
/// let mut polls = 0;
/// let frame_len: Result<usize, TimeoutError<()>> = block_timeout!(
///     &mut timer,
///     {
///         polls += 1;
///         Ok(20)
///     }
/// );
/// assert_eq!(frame_len.unwrap(), 20);
/// assert_eq!(polls, 1);
///
/// let status: Result<u32, TimeoutError<()>> = block_timeout!(
///     &mut timer,
///     Err(nb::Error::WouldBlock)
/// );
/// assert!(matches!(status, Err(TimeoutError::Timeout)));
/// ```
#[macro_export]
macro_rules! block_timeout {
    ($timer:expr, $op:expr) => {
        {
            // Reject anything that isn't a timer with a readable error
            fn assert_count_down<T>(_: &mut T)
                where T: embedded_hal::timer::CountDown {}
            assert_count_down($timer);

            loop {
                match $op {
                    Ok(value) =>
                        break Ok(value),
                    Err(nb::Error::Other(error)) =>
                        break Err($crate::macros::TimeoutError::Other(error)),
                    Err(nb::Error::WouldBlock) =>
                        (),
                }

                // The error type is `Void`, so only `WouldBlock` can get here
                if embedded_hal::timer::CountDown::wait($timer).is_ok() {
                    break Err($crate::macros::TimeoutError::Timeout);
                }
            }
        }
    }
}


/// Error returned by [`block_timeout`]
#[derive(Debug, Eq, PartialEq)]
pub enum TimeoutError<E> {
    /// The timer expired before the operation completed
    Timeout,

    /// The operation failed
    Other(E),
}
