use crate::osc::Message;

/// Outbound half of the device protocol.
///
/// Sending is best-effort: implementations never report failures back, at
/// most they log them. Callers must not expect any acknowledgment.
pub trait MessageSender {
    fn send(&mut self, msg: &Message);
}

impl MessageSender for Vec<Message> {
    fn send(&mut self, msg: &Message) {
        self.push(msg.clone());
    }
}
