//! Active destination channel selection.
//!
//! The selection is kept equal to the id set of the server's destination list:
//! ids that survive a server change keep their state, new ids arrive selected,
//! vanished ids are dropped.  Every client edit produces the outgoing list that
//! is written back as the new server list.

use std::collections::HashSet;

use thiserror::Error;

use crate::protocol::ChannelRef;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("channel id is empty")]
    EmptyId,
    #[error("channel {0} is already in the list")]
    Duplicate(String),
    #[error("channel {0} is not in the list")]
    Unknown(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSelection {
    known: Vec<ChannelRef>,
    selected: HashSet<String>,
}

impl ChannelSelection {
    pub fn from_channels(channels: &[ChannelRef]) -> Self {
        let mut sel = Self::default();
        sel.reconcile(channels);
        sel
    }

    /// Merge a new server-provided list into the selection.
    pub fn reconcile(&mut self, channels: &[ChannelRef]) {
        let incoming: HashSet<&str> = channels.iter().map(|c| c.channel_id.as_str()).collect();
        let previous: HashSet<&str> = self.known.iter().map(|c| c.channel_id.as_str()).collect();

        let mut selected: HashSet<String> = self
            .selected
            .iter()
            .filter(|id| incoming.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &incoming {
            if !previous.contains(id) {
                selected.insert((*id).to_string());
            }
        }

        self.known = channels.to_vec();
        self.selected = selected;
    }

    pub fn channels(&self) -> &[ChannelRef] {
        &self.known
    }

    pub fn is_selected(&self, channel_id: &str) -> bool {
        self.selected.contains(channel_id)
    }

    pub fn selected_ids(&self) -> &HashSet<String> {
        &self.selected
    }

    /// Known channels whose id is selected, in list order.
    pub fn outgoing(&self) -> Vec<ChannelRef> {
        self.known
            .iter()
            .filter(|c| self.selected.contains(&c.channel_id))
            .cloned()
            .collect()
    }

    /// Flip one channel and return the list to write back.
    pub fn toggle(&mut self, channel_id: &str) -> Result<Vec<ChannelRef>, SelectionError> {
        if !self.known.iter().any(|c| c.channel_id == channel_id) {
            return Err(SelectionError::Unknown(channel_id.to_string()));
        }
        if !self.selected.remove(channel_id) {
            self.selected.insert(channel_id.to_string());
        }
        Ok(self.outgoing())
    }

    /// List to write back after adding `channel` (selected).  The selection
    /// itself only changes once the server list comes back.
    pub fn with_added(&self, channel: ChannelRef) -> Result<Vec<ChannelRef>, SelectionError> {
        if channel.channel_id.is_empty() {
            return Err(SelectionError::EmptyId);
        }
        if self.known.iter().any(|c| c.channel_id == channel.channel_id) {
            return Err(SelectionError::Duplicate(channel.channel_id));
        }
        let mut out = self.outgoing();
        out.push(channel);
        Ok(out)
    }

    /// List to write back after removing `channel_id`.
    pub fn with_removed(&self, channel_id: &str) -> Result<Vec<ChannelRef>, SelectionError> {
        if !self.known.iter().any(|c| c.channel_id == channel_id) {
            return Err(SelectionError::Unknown(channel_id.to_string()));
        }
        Ok(self
            .outgoing()
            .into_iter()
            .filter(|c| c.channel_id != channel_id)
            .collect())
    }

    /// List to write back after replacing `channel_id` in place.
    pub fn with_renamed(
        &self,
        channel_id: &str,
        channel: ChannelRef,
    ) -> Result<Vec<ChannelRef>, SelectionError> {
        if channel.channel_id.is_empty() {
            return Err(SelectionError::EmptyId);
        }
        if !self.known.iter().any(|c| c.channel_id == channel_id) {
            return Err(SelectionError::Unknown(channel_id.to_string()));
        }
        if channel.channel_id != channel_id
            && self.known.iter().any(|c| c.channel_id == channel.channel_id)
        {
            return Err(SelectionError::Duplicate(channel.channel_id));
        }
        Ok(self
            .outgoing()
            .into_iter()
            .map(|c| {
                if c.channel_id == channel_id {
                    channel.clone()
                } else {
                    c
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(id: &str) -> ChannelRef {
        ChannelRef::new(id, format!("Channel {}", id))
    }

    fn ids(list: &[ChannelRef]) -> HashSet<String> {
        list.iter().map(|c| c.channel_id.clone()).collect()
    }

    #[test]
    fn new_channels_arrive_selected() {
        let sel = ChannelSelection::from_channels(&[ch("a"), ch("b")]);
        assert!(sel.is_selected("a"));
        assert!(sel.is_selected("b"));
    }

    #[test]
    fn vanished_channels_are_dropped() {
        let mut sel = ChannelSelection::from_channels(&[ch("a"), ch("b")]);
        sel.reconcile(&[ch("b"), ch("c")]);
        assert!(!sel.is_selected("a"));
        assert_eq!(sel.selected_ids(), &ids(&[ch("b"), ch("c")]));
    }

    #[test]
    fn toggle_writes_back_the_selected_subset() {
        let mut sel = ChannelSelection::from_channels(&[ch("a"), ch("b"), ch("c")]);
        let out = sel.toggle("b").unwrap();
        assert_eq!(out, vec![ch("a"), ch("c")]);

        // Server echoes the written list back.
        sel.reconcile(&out);
        assert_eq!(sel.selected_ids(), &ids(&out));
        assert_eq!(sel.channels(), out.as_slice());
    }

    #[test]
    fn selection_equals_server_list_after_every_round_trip() {
        let mut sel = ChannelSelection::from_channels(&[ch("a"), ch("b")]);
        let steps: Vec<Box<dyn Fn(&mut ChannelSelection) -> Vec<ChannelRef>>> = vec![
            Box::new(|s: &mut ChannelSelection| s.with_added(ch("c")).unwrap()),
            Box::new(|s: &mut ChannelSelection| s.toggle("a").unwrap()),
            Box::new(|s: &mut ChannelSelection| s.with_removed("c").unwrap()),
            Box::new(|_: &mut ChannelSelection| vec![ch("x"), ch("b")]),
        ];
        for step in steps {
            let server = step(&mut sel);
            sel.reconcile(&server);
            assert_eq!(sel.selected_ids(), &ids(&server));
        }
    }

    #[test]
    fn bad_edits_are_rejected() {
        let mut sel = ChannelSelection::from_channels(&[ch("a")]);
        assert_eq!(
            sel.with_added(ch("a")),
            Err(SelectionError::Duplicate("a".into()))
        );
        assert_eq!(
            sel.with_added(ChannelRef::new("  ", "")),
            Err(SelectionError::EmptyId)
        );
        assert_eq!(sel.toggle("zz"), Err(SelectionError::Unknown("zz".into())));
        assert!(sel.with_removed("zz").is_err());
    }

    #[test]
    fn rename_keeps_position_and_rejects_collisions() {
        let sel = ChannelSelection::from_channels(&[ch("a"), ch("b")]);
        let out = sel.with_renamed("a", ChannelRef::new("z", "Zed")).unwrap();
        assert_eq!(out, vec![ChannelRef::new("z", "Zed"), ch("b")]);
        assert_eq!(
            sel.with_renamed("a", ch("b")),
            Err(SelectionError::Duplicate("b".into()))
        );
        // Renaming only the display name is fine.
        assert!(sel.with_renamed("a", ChannelRef::new("a", "New")).is_ok());
    }
}
