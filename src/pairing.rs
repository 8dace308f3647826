//! Stereo pairing - groups the sends feeding a channel strip
//!
//! 左チャンネルに届く送りごとに、右チャンネル側の未消費の送りから相方を探す。
//! (a) 同じソースで from_channel が +1 → ステレオペア
//! (b) 同じソースで from_channel が同一 → モノ→ステレオ
//! それ以外はモノ。右側で消費されなかった送りもモノとして残る。
//!
//! Matching scans in connection-list (creation) order and the first
//! unconsumed match wins, so the grouping is a pure function of the store.

use crate::graph::{ConnectionId, GraphStore, NodeId, NodeKind};

/// How a contributing node feeds the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pairing {
    /// A single unlinked send.
    Mono,
    /// Adjacent source channels onto left/right.
    TrueStereo,
    /// One source channel duplicated onto both ears.
    MonoToStereo,
}

/// Target of a resolve: a single channel or a left/right pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChannels {
    Mono(u16),
    Stereo { left: u16, right: u16 },
}

impl TargetChannels {
    /// Pair starting at `left` (`left`, `left + 1`). The last channel has
    /// no right neighbour and resolves as mono.
    pub fn pair(left: u16) -> Self {
        match left.checked_add(1) {
            Some(right) => TargetChannels::Stereo { left, right },
            None => TargetChannels::Mono(left),
        }
    }
}

/// One strip entry: a contributing node and the send(s) it uses.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerSource {
    pub node: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub pairing: Pairing,
    /// Source channel of the first send in the group
    pub from_channel: u16,
    /// Send landing on the left (or only) target channel
    pub left: Option<ConnectionId>,
    /// Send landing on the right target channel
    pub right: Option<ConnectionId>,
}

impl MixerSource {
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> {
        self.left.into_iter().chain(self.right)
    }
}

pub struct StereoPairingResolver<'a> {
    store: &'a GraphStore,
}

impl<'a> StereoPairingResolver<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Enumerate and classify everything feeding `target` on `channels`.
    ///
    /// Display order is sources before buses, then label; the sort is stable
    /// so entries with equal keys keep their matching order.
    pub fn resolve(&self, target: NodeId, channels: TargetChannels) -> Vec<MixerSource> {
        let mut entries = match channels {
            TargetChannels::Mono(channel) => self
                .store
                .connections_to(target)
                .filter(|c| c.to_channel == channel)
                .filter_map(|c| self.entry(c.from, c.from_channel, Pairing::Mono, Some(c.id), None))
                .collect(),
            TargetChannels::Stereo { left, right } => self.resolve_pair(target, left, right),
        };

        entries.sort_by(|a, b| {
            kind_rank(a.kind)
                .cmp(&kind_rank(b.kind))
                .then_with(|| a.label.cmp(&b.label))
        });
        entries
    }

    fn resolve_pair(&self, target: NodeId, left: u16, right: u16) -> Vec<MixerSource> {
        let lefts: Vec<_> = self
            .store
            .connections_to(target)
            .filter(|c| c.to_channel == left)
            .collect();
        let rights: Vec<_> = self
            .store
            .connections_to(target)
            .filter(|c| c.to_channel == right)
            .collect();
        let mut consumed = vec![false; rights.len()];
        let mut entries = Vec::with_capacity(lefts.len() + rights.len());

        for l in &lefts {
            let find = |wanted: u16, consumed: &[bool]| {
                rights.iter().enumerate().position(|(i, r)| {
                    !consumed[i] && r.from == l.from && r.from_channel == wanted
                })
            };

            let stereo = l.from_channel.checked_add(1).and_then(|next| find(next, &consumed));
            let (pairing, partner) = match stereo {
                Some(i) => (Pairing::TrueStereo, Some(i)),
                None => match find(l.from_channel, &consumed) {
                    Some(i) => (Pairing::MonoToStereo, Some(i)),
                    None => (Pairing::Mono, None),
                },
            };

            let right_id = partner.map(|i| {
                consumed[i] = true;
                rights[i].id
            });
            entries.extend(self.entry(l.from, l.from_channel, pairing, Some(l.id), right_id));
        }

        for (i, r) in rights.iter().enumerate() {
            if !consumed[i] {
                entries.extend(self.entry(r.from, r.from_channel, Pairing::Mono, None, Some(r.id)));
            }
        }
        entries
    }

    fn entry(
        &self,
        node: NodeId,
        from_channel: u16,
        pairing: Pairing,
        left: Option<ConnectionId>,
        right: Option<ConnectionId>,
    ) -> Option<MixerSource> {
        let source = self.store.node(node)?;
        Some(MixerSource {
            node,
            kind: source.kind(),
            label: source.label.clone(),
            pairing,
            from_channel,
            left,
            right,
        })
    }
}

fn kind_rank(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::Source => 0,
        NodeKind::Bus => 1,
        NodeKind::Sink => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConnectionRequest, DeviceBinding, NodeSpec};

    struct Fixture {
        store: GraphStore,
        src: NodeId,
        bus: NodeId,
        sink: NodeId,
    }

    fn fixture() -> Fixture {
        let mut store = GraphStore::new();
        let src = store
            .add_node(
                NodeSpec::device_source(DeviceBinding::new(3, "Interface", "USB"), 4)
                    .with_label("Interface"),
            )
            .unwrap()
            .id;
        let bus = store.add_node(NodeSpec::bus("Reverb", 2)).unwrap().id;
        let sink = store
            .add_node(NodeSpec::sink(DeviceBinding::new(7, "Speakers", "Built-In"), 0, 2))
            .unwrap()
            .id;
        Fixture {
            store,
            src,
            bus,
            sink,
        }
    }

    fn connect(f: &mut Fixture, from: NodeId, from_ch: u16, to_ch: u16) -> ConnectionId {
        f.store
            .add_connection(ConnectionRequest::new(from, from_ch, f.sink, to_ch))
            .unwrap()
            .id
    }

    #[test]
    fn test_true_stereo_pair() {
        let mut f = fixture();
        let l = { let src = f.src; connect(&mut f, src, 0, 0) };
        let r = { let src = f.src; connect(&mut f, src, 1, 1) };

        let entries = StereoPairingResolver::new(&f.store).resolve(f.sink, TargetChannels::pair(0));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pairing, Pairing::TrueStereo);
        assert_eq!(entries[0].left, Some(l));
        assert_eq!(entries[0].right, Some(r));
    }

    #[test]
    fn test_mono_to_stereo() {
        let mut f = fixture();
        { let src = f.src; connect(&mut f, src, 2, 0) };
        { let src = f.src; connect(&mut f, src, 2, 1) };

        let entries = StereoPairingResolver::new(&f.store).resolve(f.sink, TargetChannels::pair(0));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pairing, Pairing::MonoToStereo);
        assert_eq!(entries[0].from_channel, 2);
    }

    #[test]
    fn test_unmatched_sides_stay_mono() {
        let mut f = fixture();
        let l = { let src = f.src; connect(&mut f, src, 0, 0) };
        let r = { let src = f.src; connect(&mut f, src, 3, 1) };

        let entries = StereoPairingResolver::new(&f.store).resolve(f.sink, TargetChannels::pair(0));
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.pairing == Pairing::Mono));
        assert_eq!(entries[0].left, Some(l));
        assert_eq!(entries[0].right, None);
        assert_eq!(entries[1].left, None);
        assert_eq!(entries[1].right, Some(r));
    }

    #[test]
    fn test_true_stereo_preferred_over_duplicate() {
        let mut f = fixture();
        // right side offers both a duplicate of ch0 and the adjacent ch1
        { let src = f.src; connect(&mut f, src, 0, 0) };
        let dup = { let src = f.src; connect(&mut f, src, 0, 1) };
        let adjacent = { let src = f.src; connect(&mut f, src, 1, 1) };

        let entries = StereoPairingResolver::new(&f.store).resolve(f.sink, TargetChannels::pair(0));
        let stereo: Vec<_> = entries
            .iter()
            .filter(|e| e.pairing == Pairing::TrueStereo)
            .collect();
        assert_eq!(stereo.len(), 1);
        assert_eq!(stereo[0].right, Some(adjacent));
        let leftover: Vec<_> = entries.iter().filter(|e| e.right == Some(dup)).collect();
        assert_eq!(leftover.len(), 1);
        assert_eq!(leftover[0].pairing, Pairing::Mono);
    }

    #[test]
    fn test_first_unconsumed_match_wins() {
        let mut f = fixture();
        // two lefts from the same channel compete for two identical rights
        let l1 = { let src = f.src; connect(&mut f, src, 0, 0) };
        let r1 = { let src = f.src; connect(&mut f, src, 1, 1) };
        let bus_l = f
            .store
            .add_connection(ConnectionRequest::new(f.bus, 0, f.sink, 0))
            .unwrap()
            .id;
        let bus_r = f
            .store
            .add_connection(ConnectionRequest::new(f.bus, 1, f.sink, 1))
            .unwrap()
            .id;

        let resolver = StereoPairingResolver::new(&f.store);
        let first = resolver.resolve(f.sink, TargetChannels::pair(0));
        for _ in 0..10 {
            assert_eq!(resolver.resolve(f.sink, TargetChannels::pair(0)), first);
        }
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].kind, NodeKind::Source);
        assert_eq!((first[0].left, first[0].right), (Some(l1), Some(r1)));
        assert_eq!(first[1].kind, NodeKind::Bus);
        assert_eq!((first[1].left, first[1].right), (Some(bus_l), Some(bus_r)));
    }

    #[test]
    fn test_grouping_stable_across_orderings() {
        // Same sends created in opposite orders classify the same way.
        let mut a = fixture();
        { let src = a.src; connect(&mut a, src, 0, 0) };
        { let src = a.src; connect(&mut a, src, 1, 1) };
        { let src = a.src; connect(&mut a, src, 2, 0) };

        let mut b = fixture();
        { let src = b.src; connect(&mut b, src, 2, 0) };
        { let src = b.src; connect(&mut b, src, 1, 1) };
        { let src = b.src; connect(&mut b, src, 0, 0) };

        let summarize = |f: &Fixture| {
            let mut groups: Vec<_> = StereoPairingResolver::new(&f.store)
                .resolve(f.sink, TargetChannels::pair(0))
                .into_iter()
                .map(|e| (e.from_channel, e.pairing == Pairing::TrueStereo))
                .collect();
            groups.sort();
            groups
        };
        assert_eq!(summarize(&a), vec![(0, true), (2, false)]);
        assert_eq!(summarize(&b), vec![(0, true), (2, false)]);
    }

    #[test]
    fn test_mono_target() {
        let mut f = fixture();
        { let src = f.src; connect(&mut f, src, 0, 0) };
        { let src = f.src; connect(&mut f, src, 1, 1) };
        let entries = StereoPairingResolver::new(&f.store).resolve(f.sink, TargetChannels::Mono(1));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pairing, Pairing::Mono);
        assert_eq!(entries[0].from_channel, 1);
    }

    #[test]
    fn test_pair_at_last_channel_is_mono() {
        assert_eq!(TargetChannels::pair(u16::MAX), TargetChannels::Mono(u16::MAX));
        assert_eq!(
            TargetChannels::pair(4),
            TargetChannels::Stereo { left: 4, right: 5 }
        );

        let f = fixture();
        let entries =
            StereoPairingResolver::new(&f.store).resolve(f.sink, TargetChannels::pair(u16::MAX));
        assert!(entries.is_empty());
    }
}
