//! `CanBus` extension writing every frame of a transfer back to back.
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::can_bus::CanBus;

/// Trait extending `CanBus` with a helper sending a frame sequence in order.
///
/// Frames of one transfer must reach the bus contiguously: callers hand the
/// whole sequence over at once instead of interleaving single sends.
pub trait FrameSender: CanBus {
    /// Send `frames` in iteration order, stopping at the first bus error.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let frames = manager.send(transfer, schema.signature)?;
    /// can_bus.send_frames(frames).await?;
    /// ```
    fn send_frames<'a, I>(
        &'a mut self,
        frames: I,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> + 'a
    where
        I: IntoIterator<Item = CanFrame> + 'a,
        I::IntoIter: 'a;
}

impl<C: CanBus> FrameSender for C {
    fn send_frames<'a, I>(
        &'a mut self,
        frames: I,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> + 'a
    where
        I: IntoIterator<Item = CanFrame> + 'a,
        I::IntoIter: 'a,
    {
        async move {
            for frame in frames {
                self.send(&frame).await?;
            }
            Ok(())
        }
    }
}
