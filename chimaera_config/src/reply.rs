//! Reply construction.
//!
//! ```text
//! /success ,is[...]  id path value...
//! /fail    ,iss      id path reason
//! /fail    ,s        reason            (no usable call id)
//! ```

use chimaera_common::consts::{FAIL_PATH, SUCCESS_PATH};
use chimaera_common::osc::{OscArg, OscMessage};

/// Messages queued for the config socket, in send order.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<OscMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an arbitrary message.
    pub fn push(&mut self, msg: OscMessage) {
        self.messages.push(msg);
    }

    /// Queue a success reply.
    pub fn success(&mut self, id: i32, path: &str, values: Vec<OscArg>) {
        self.push(success(id, path, values));
    }

    /// Queue a failure reply.
    pub fn fail(&mut self, id: i32, path: &str, reason: impl std::fmt::Display) {
        self.push(fail(id, path, reason));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Queued messages.
    pub fn messages(&self) -> &[OscMessage] {
        &self.messages
    }

    /// Take all queued messages.
    pub fn drain(&mut self) -> std::vec::Drain<'_, OscMessage> {
        self.messages.drain(..)
    }
}

/// `/success id path value...`
pub fn success(id: i32, path: &str, values: Vec<OscArg>) -> OscMessage {
    let mut args = Vec::with_capacity(values.len() + 2);
    args.push(OscArg::Int(id));
    args.push(OscArg::string(path));
    args.extend(values);
    OscMessage::new(SUCCESS_PATH, args)
}

/// `/fail id path reason`
pub fn fail(id: i32, path: &str, reason: impl std::fmt::Display) -> OscMessage {
    OscMessage::new(
        FAIL_PATH,
        vec![
            OscArg::Int(id),
            OscArg::string(path),
            OscArg::string(reason.to_string()),
        ],
    )
}

/// `/fail reason`, for calls without a usable id.
pub fn fail_bare(reason: impl std::fmt::Display) -> OscMessage {
    OscMessage::new(FAIL_PATH, vec![OscArg::string(reason.to_string())])
}

/// Failure notice replacing a reply that could not be framed.
pub fn oversized_notice(reply: &OscMessage, reason: impl std::fmt::Display) -> OscMessage {
    let id = reply.args.first().and_then(OscArg::as_int);
    let path = reply.args.get(1).and_then(OscArg::as_str);
    match (id, path) {
        (Some(id), Some(path)) => fail(id, path, reason),
        _ => fail_bare(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_carries_id_and_path() {
        let msg = success(7, "/chimaera/rate", vec![OscArg::Int(2000)]);
        assert_eq!(msg.path, SUCCESS_PATH);
        assert_eq!(
            msg.args,
            vec![
                OscArg::Int(7),
                OscArg::string("/chimaera/rate"),
                OscArg::Int(2000)
            ]
        );
    }

    #[test]
    fn oversized_notice_keeps_call_identity() {
        let reply = success(3, "/chimaera/custom/item/0", vec![]);
        let notice = oversized_notice(&reply, "too big");
        assert_eq!(notice, fail(3, "/chimaera/custom/item/0", "too big"));

        let range = OscMessage::new("/range/qui", vec![OscArg::Int(1)]);
        assert_eq!(oversized_notice(&range, "too big"), fail_bare("too big"));
    }

    #[test]
    fn outbox_drains_in_order() {
        let mut outbox = Outbox::new();
        outbox.success(1, "/a", vec![]);
        outbox.fail(2, "/b", "nope");
        assert_eq!(outbox.len(), 2);
        let paths: Vec<_> = outbox.drain().map(|m| m.path).collect();
        assert_eq!(paths, vec![SUCCESS_PATH, FAIL_PATH]);
        assert!(outbox.is_empty());
    }
}
