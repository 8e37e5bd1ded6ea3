//! `ConfdFilterCallback` equivalent (SPEC_FULL.md §4.7): suppresses
//! stale or duplicate-by-serial replies, delivering only the newest
//! per salt (or same-serial-but-changed-content replies).

use crate::confd::protocol::ConfdReply;
use dashmap::DashMap;

#[derive(Clone)]
struct Seen {
    serial: u64,
    answer: serde_json::Value,
}

pub struct ConfdFilterCallback {
    seen: DashMap<String, Seen>,
}

impl ConfdFilterCallback {
    pub fn new() -> Self {
        Self { seen: DashMap::new() }
    }

    /// Returns `true` if `reply` should be delivered to the user
    /// callback: first reply for its salt, strictly newer serial, or
    /// same serial with different answer content (inconsistency).
    pub fn accept(&self, reply: &ConfdReply) -> bool {
        match self.seen.get(&reply.salt) {
            None => {
                self.seen.insert(
                    reply.salt.clone(),
                    Seen { serial: reply.serial, answer: reply.answer.clone() },
                );
                true
            }
            Some(prev) => {
                let deliver = reply.serial > prev.serial
                    || (reply.serial == prev.serial && reply.answer != prev.answer);
                if deliver {
                    drop(prev);
                    self.seen.insert(
                        reply.salt.clone(),
                        Seen { serial: reply.serial, answer: reply.answer.clone() },
                    );
                }
                deliver
            }
        }
    }

    pub fn forget(&self, salt: &str) {
        self.seen.remove(salt);
    }
}

impl Default for ConfdFilterCallback {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(salt: &str, serial: u64, answer: serde_json::Value) -> ConfdReply {
        ConfdReply { salt: salt.into(), status: 0, serial, answer }
    }

    #[test]
    fn scenario_s5_confd_filter() {
        let filter = ConfdFilterCallback::new();
        let mut delivered = 0;

        if filter.accept(&reply("s1", 3, serde_json::json!("a"))) {
            delivered += 1;
        }
        // identical duplicate at serial 3: suppressed.
        if filter.accept(&reply("s1", 3, serde_json::json!("a"))) {
            delivered += 1;
        }
        // serial 5 with different payload: delivered.
        if filter.accept(&reply("s1", 5, serde_json::json!("b"))) {
            delivered += 1;
        }
        // stale serial 4: suppressed.
        if filter.accept(&reply("s1", 4, serde_json::json!("c"))) {
            delivered += 1;
        }

        assert_eq!(delivered, 2);
    }

    #[test]
    fn same_serial_changed_content_is_delivered() {
        let filter = ConfdFilterCallback::new();
        assert!(filter.accept(&reply("s", 1, serde_json::json!("x"))));
        assert!(filter.accept(&reply("s", 1, serde_json::json!("y"))));
        assert!(!filter.accept(&reply("s", 1, serde_json::json!("y"))));
    }
}
