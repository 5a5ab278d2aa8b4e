use crate::peer::lock;
use crate::transport::{EventRelay, Payload, TransportEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

/// The data channel of one connection, once it exists.
pub type ChannelSlot = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

/// Stores `dc` in `slot` and forwards its lifecycle to `relay`.
pub fn attach_dc(dc: &Arc<RTCDataChannel>, relay: &Arc<EventRelay>, slot: &ChannelSlot) {
    info!(label = dc.label(), "data channel attached");
    *lock(slot) = Some(dc.clone());

    let open = open_once(relay.clone());
    dc.on_open(Box::new({
        let open = open.clone();
        move || {
            open();
            Box::pin(async {})
        }
    }));

    dc.on_message(Box::new({
        let relay = relay.clone();
        move |msg: DataChannelMessage| {
            relay.emit(TransportEvent::Data(payload(msg)));
            Box::pin(async {})
        }
    }));

    dc.on_close(Box::new({
        let relay = relay.clone();
        move || {
            debug!("data channel closed");
            relay.emit(TransportEvent::Close);
            Box::pin(async {})
        }
    }));

    dc.on_error(Box::new({
        let relay = relay.clone();
        move |err: webrtc::Error| {
            warn!(error = %err, "data channel error");
            relay.emit(TransportEvent::Error(err.to_string()));
            Box::pin(async {})
        }
    }));

    // An answerer may receive a channel that is already open; the handler
    // above can fire for it too.
    if dc.ready_state() == RTCDataChannelState::Open {
        open();
    }
}

/// Emits `Open` on the first call only.
fn open_once(relay: Arc<EventRelay>) -> Arc<dyn Fn() + Send + Sync> {
    let opened = AtomicBool::new(false);
    Arc::new(move || {
        if !opened.swap(true, Ordering::AcqRel) {
            debug!("data channel opened");
            relay.emit(TransportEvent::Open);
        }
    })
}

fn payload(msg: DataChannelMessage) -> Payload {
    if !msg.is_string {
        return Payload::Binary(msg.data);
    }
    match String::from_utf8(msg.data.to_vec()) {
        Ok(text) => Payload::Text(text),
        Err(_) => Payload::Binary(msg.data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn open_is_reported_once() {
        use crate::session::{SessionEvent, TransportNotifier};
        use tokio::sync::mpsc;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let relay = Arc::new(EventRelay::new());
        relay.attach(TransportNotifier::new(1, tx));

        let open = open_once(relay);
        open();
        open();

        let mut opens = 0;
        while let Ok(SessionEvent::Transport { event, .. }) = rx.try_recv() {
            assert_eq!(event, TransportEvent::Open);
            opens += 1;
        }
        assert_eq!(opens, 1);
    }

    #[test]
    fn string_messages_become_text() {
        let msg = DataChannelMessage {
            is_string: true,
            data: Bytes::from_static("héllo".as_bytes()),
        };
        assert_eq!(payload(msg), Payload::Text("héllo".into()));
    }

    #[test]
    fn binary_and_invalid_utf8_stay_binary() {
        let binary = DataChannelMessage {
            is_string: false,
            data: Bytes::from_static(b"hi"),
        };
        assert_eq!(payload(binary), Payload::Binary(Bytes::from_static(b"hi")));

        let broken = DataChannelMessage {
            is_string: true,
            data: Bytes::from_static(&[0xc3, 0x28]),
        };
        assert!(matches!(payload(broken), Payload::Binary(_)));
    }
}
