//! Contains utilities that are useful when working with the ranging tag

use embedded_hal::timer::CountDown;
use void::Void;


/// A timer that never expires
///
/// Passing this to [`Tag::range`](crate::tag::Tag::range) makes a ranging
/// cycle wait for as long as it takes. The cycle then only ends early if the
/// driver fails. Waiting for Responses is still bounded by the transceiver's
/// own receive timeouts, if those are configured.
///
/// # Example
///
/// ``` rust
/// use embedded_hal::timer::CountDown;
/// use dw1000_ds_twr_tag::util::Unbounded;
///
/// let mut timer = Unbounded;
/// timer.start(());
///
/// assert!(timer.wait().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Unbounded;

impl CountDown for Unbounded {
    type Time = ();

    fn start<T>(&mut self, _: T)
        where T: Into<Self::Time>
    {}

    fn wait(&mut self) -> nb::Result<(), Void> {
        Err(nb::Error::WouldBlock)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_expires() {
        let mut timer = Unbounded;
        timer.start(());

        for _ in 0..1000 {
            assert!(matches!(timer.wait(), Err(nb::Error::WouldBlock)));
        }
    }
}
