use crate::error::LinkError;
use bytes::Bytes;
use std::future::Future;

/// The BLE link to the device, reduced to what the session needs.
///
/// Discovery, GATT resolution and notification subscription happen inside
/// `connect`. Notifications are not pulled through this trait: whoever owns
/// the transport feeds each one to
/// [`DeviceSession::handle_notification`](crate::session::DeviceSession::handle_notification),
/// and reports an unsolicited link loss through
/// [`DeviceSession::handle_link_lost`](crate::session::DeviceSession::handle_link_lost).
pub trait Transport {
    /// Establishes the link.
    fn connect(&mut self) -> impl Future<Output = Result<(), LinkError>>;

    /// Writes one frame to the device. Fire-and-forget: success only means
    /// the write was handed to the link.
    fn send(&mut self, frame: Bytes) -> Result<(), LinkError>;

    /// Tears down the link. Must be safe to call when already disconnected.
    fn disconnect(&mut self);
}
