use crate::protocol::RoomSnapshot;

/// What this client knows about the room it is in. Consumed as the relay
/// reports it; nothing here is computed locally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomView {
    pub id: String,
    pub name: Option<String>,
    pub host_id: Option<String>,
    pub participant_count: Option<u32>,
    pub media_id: Option<String>,
}

impl RoomView {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Takes every field the snapshot carries, keeping the rest.
    pub fn absorb(&mut self, snapshot: &RoomSnapshot) {
        if snapshot.name.is_some() {
            self.name = snapshot.name.clone();
        }
        if snapshot.host_id.is_some() {
            self.host_id = snapshot.host_id.clone();
        }
        if snapshot.participant_count.is_some() {
            self.participant_count = snapshot.participant_count;
        }
        if snapshot.media_id.is_some() {
            self.media_id = snapshot.media_id.clone();
        }
    }

    pub fn set_participant_count(&mut self, count: Option<u32>) {
        if count.is_some() {
            self.participant_count = count;
        }
    }

    pub fn is_hosted_by(&self, client_id: Option<&str>) -> bool {
        matches!((self.host_id.as_deref(), client_id), (Some(host), Some(me)) if host == me)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_keeps_fields_the_snapshot_omits() {
        let mut view = RoomView::new("r1");
        view.absorb(&RoomSnapshot {
            name: Some("movie night".into()),
            host_id: Some("h".into()),
            participant_count: Some(3),
            ..RoomSnapshot::default()
        });
        view.absorb(&RoomSnapshot {
            participant_count: Some(4),
            ..RoomSnapshot::default()
        });
        assert_eq!(view.name.as_deref(), Some("movie night"));
        assert_eq!(view.participant_count, Some(4));
        assert!(view.is_hosted_by(Some("h")));
        assert!(!view.is_hosted_by(None));
    }
}
