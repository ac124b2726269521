//! Frame-to-frame stabilisation of card and chip observations.
//!
//! Objects are tracked by position only: each confirmed observation owns a
//! synthetic slot, and a new observation takes over the slot of the nearest
//! previous one. Appearances and disappearances only reach the emitted state
//! after they persisted for a few frames, and so does a change of face or
//! chip count at an existing slot.

use blackjack_vision_cards::{CardFace, CardObservation};
use blackjack_vision_chips::ChipObservation;
use blackjack_vision_core::BBox;
use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// An observation the stabiliser can track.
pub trait Trackable: Clone {
    fn position(&self) -> Point2<f32>;
    fn bbox(&self) -> &BBox;
    fn confidence(&self) -> f32;
    /// True when `other` shows the same object content (face, chip count).
    fn same_identity(&self, other: &Self) -> bool;
}

impl Trackable for CardObservation {
    fn position(&self) -> Point2<f32> {
        self.centroid
    }

    fn bbox(&self) -> &BBox {
        &self.bbox
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.face == other.face
    }
}

impl Trackable for ChipObservation {
    fn position(&self) -> Point2<f32> {
        self.centroid
    }

    fn bbox(&self) -> &BBox {
        &self.bbox
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.count == other.count && self.denomination == other.denomination
    }
}

/// Debounce parameters of one object category.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackParams {
    /// Observations below this confidence are ignored.
    pub min_confidence: f32,
    /// Largest overlap (fraction of the smaller box) between two entries.
    pub max_overlap: f32,
    /// Matching radius between consecutive frames, in canvas pixels.
    pub max_match_distance: f32,
    /// Frames an object (or a new identity at a slot) must persist.
    pub confirm_frames: u32,
    /// Frames a confirmed object may be unseen before it is dropped.
    pub max_missing_frames: u32,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_overlap: 0.3,
            max_match_distance: 40.0,
            confirm_frames: 2,
            max_missing_frames: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerParams {
    pub cards: TrackParams,
    pub chips: TrackParams,
    /// Largest overlap (fraction of the smaller box) between an emitted card
    /// and an emitted chip stack.
    pub max_cross_overlap: f32,
}

impl Default for StabilizerParams {
    fn default() -> Self {
        Self {
            cards: TrackParams {
                min_confidence: 0.75,
                ..TrackParams::default()
            },
            // ambiguous stacks still help continuity
            chips: TrackParams {
                min_confidence: 0.0,
                ..TrackParams::default()
            },
            max_cross_overlap: 0.3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    /// Seen, not yet for `confirm_frames` frames.
    Candidate,
    Confirmed,
    /// Confirmed, unseen in the latest frame(s).
    Missing,
}

/// One tracked object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Track<T> {
    pub slot: u64,
    pub observation: T,
    /// Frames this track has been observed in.
    pub age: u32,
    /// Consecutive frames without an observation.
    pub missing: u32,
    pub status: TrackStatus,
    #[serde(skip)]
    pub(crate) pending: Option<(T, u32)>,
}

impl<T: Trackable> Track<T> {
    fn new(slot: u64, observation: T, confirm_frames: u32) -> Self {
        let mut track = Self {
            slot,
            observation,
            age: 1,
            missing: 0,
            status: TrackStatus::Candidate,
            pending: None,
        };
        track.refresh_status(confirm_frames);
        track
    }

    fn observe(&mut self, obs: T, confirm_frames: u32) {
        self.age += 1;
        self.missing = 0;
        if self.observation.same_identity(&obs) || self.status == TrackStatus::Candidate {
            self.observation = obs;
            self.pending = None;
        } else {
            let seen = match &self.pending {
                Some((prev, n)) if prev.same_identity(&obs) => n + 1,
                _ => 1,
            };
            if seen >= confirm_frames {
                self.observation = obs;
                self.pending = None;
            } else {
                self.pending = Some((obs, seen));
            }
        }
        self.refresh_status(confirm_frames);
    }

    fn refresh_status(&mut self, confirm_frames: u32) {
        self.status = if self.age >= confirm_frames {
            TrackStatus::Confirmed
        } else {
            TrackStatus::Candidate
        };
    }

    pub fn is_confirmed(&self) -> bool {
        self.status != TrackStatus::Candidate
    }
}

/// Debounced tracking of one object category.
#[derive(Clone, Debug)]
pub struct Tracker<T> {
    params: TrackParams,
    tracks: Vec<Track<T>>,
    next_slot: u64,
}

impl<T: Trackable> Tracker<T> {
    pub fn new(params: TrackParams) -> Self {
        Self {
            params,
            tracks: Vec::new(),
            next_slot: 0,
        }
    }

    #[inline]
    pub fn params(&self) -> &TrackParams {
        &self.params
    }

    /// All tracks, candidates included, ordered by slot.
    pub fn tracks(&self) -> &[Track<T>] {
        &self.tracks
    }

    /// Tracks that belong in the emitted state.
    pub fn confirmed(&self) -> impl Iterator<Item = &Track<T>> {
        self.tracks.iter().filter(|t| t.is_confirmed())
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    /// Fold one frame of observations into the tracks.
    pub fn update(&mut self, observations: Vec<T>) {
        let p = self.params;
        let mut obs: Vec<Option<T>> = dedup(
            observations
                .into_iter()
                .filter(|o| o.confidence() >= p.min_confidence)
                .collect(),
            p.max_overlap,
        )
        .into_iter()
        .map(Some)
        .collect();

        let assignment = self.match_observations(&obs);

        let mut next = Vec::with_capacity(self.tracks.len() + obs.len());
        for (mut track, matched) in self.tracks.drain(..).zip(assignment) {
            if let Some(o) = matched.and_then(|i| obs[i].take()) {
                track.observe(o, p.confirm_frames);
                next.push(track);
            } else if !track.is_confirmed() {
                debug!("slot {} dropped as a one-off", track.slot);
            } else {
                track.missing += 1;
                if track.missing > p.max_missing_frames {
                    debug!("slot {} gone after {} missing frames", track.slot, track.missing);
                } else {
                    track.status = TrackStatus::Missing;
                    next.push(track);
                }
            }
        }
        for o in obs.into_iter().flatten() {
            next.push(Track::new(self.next_slot, o, p.confirm_frames));
            self.next_slot += 1;
        }

        self.tracks = resolve_overlaps(next, p.max_overlap);
    }

    /// Greedy one-to-one nearest matching of tracks to observations.
    fn match_observations(&self, obs: &[Option<T>]) -> Vec<Option<usize>> {
        let mut assignment = vec![None; self.tracks.len()];
        if obs.is_empty() || self.tracks.is_empty() {
            return assignment;
        }
        let coords: Vec<[f32; 2]> = obs
            .iter()
            .flatten()
            .map(|o| {
                let q = o.position();
                [q.x, q.y]
            })
            .collect();
        let tree: KdTree<f32, 2> = (&coords).into();
        let r2 = self.params.max_match_distance * self.params.max_match_distance;

        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            let q = track.observation.position();
            for nn in tree.within::<SquaredEuclidean>(&[q.x, q.y], r2) {
                pairs.push((nn.distance, ti, nn.item as usize));
            }
        }
        pairs.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut taken = vec![false; obs.len()];
        for (_, ti, oi) in pairs {
            if assignment[ti].is_none() && !taken[oi] {
                assignment[ti] = Some(oi);
                taken[oi] = true;
            }
        }
        assignment
    }
}

impl<T: Trackable> Default for Tracker<T> {
    fn default() -> Self {
        Self::new(TrackParams::default())
    }
}

/// Keep the most confident of mutually overlapping observations.
fn dedup<T: Trackable>(mut obs: Vec<T>, max_overlap: f32) -> Vec<T> {
    obs.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    let mut kept: Vec<T> = Vec::with_capacity(obs.len());
    for o in obs {
        if kept
            .iter()
            .all(|k| k.bbox().overlap_fraction(o.bbox()) <= max_overlap)
        {
            kept.push(o);
        }
    }
    kept
}

/// Drop the lower-priority track of every overlapping pair.
fn resolve_overlaps<T: Trackable>(mut tracks: Vec<Track<T>>, max_overlap: f32) -> Vec<Track<T>> {
    tracks.sort_by(|a, b| {
        b.is_confirmed()
            .cmp(&a.is_confirmed())
            .then(b.age.cmp(&a.age))
            .then(
                b.observation
                    .confidence()
                    .total_cmp(&a.observation.confidence()),
            )
            .then(a.slot.cmp(&b.slot))
    });
    let mut kept: Vec<Track<T>> = Vec::with_capacity(tracks.len());
    for t in tracks {
        let clash = kept.iter().any(|k| {
            k.observation.bbox().overlap_fraction(t.observation.bbox()) > max_overlap
        });
        if clash {
            debug!("slot {} suppressed by an overlapping track", t.slot);
        } else {
            kept.push(t);
        }
    }
    kept.sort_by_key(|t| t.slot);
    kept
}

/// The confirmed tracked cards and chips.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StableState {
    pub cards: Vec<Track<CardObservation>>,
    pub chips: Vec<Track<ChipObservation>>,
}

impl StableState {
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty() && self.chips.is_empty()
    }

    /// Nearest stable card within `max_distance` of `p`.
    pub fn nearest_card(&self, p: Point2<f32>, max_distance: f32) -> Option<&Track<CardObservation>> {
        nearest(&self.cards, p, max_distance)
    }

    pub fn nearest_chip(&self, p: Point2<f32>, max_distance: f32) -> Option<&Track<ChipObservation>> {
        nearest(&self.chips, p, max_distance)
    }
}

/// Nearest track within `max_distance` of `p`.
pub fn nearest<T: Trackable>(tracks: &[Track<T>], p: Point2<f32>, max_distance: f32) -> Option<&Track<T>> {
    tracks
        .iter()
        .map(|t| ((t.observation.position() - p).norm(), t))
        .filter(|(d, _)| *d <= max_distance)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, t)| t)
}

/// Combine confirmed cards and chips; of a card and a chip stack overlapping
/// above `max_overlap` only the older (then more confident) one is emitted,
/// the card on a full tie.
///
/// Suppressed tracks stay alive in their tracker.
fn merge_categories(
    cards: Vec<Track<CardObservation>>,
    chips: Vec<Track<ChipObservation>>,
    max_overlap: f32,
) -> StableState {
    // (age, confidence, is_card, index)
    let mut order: Vec<(u32, f32, bool, usize)> = cards
        .iter()
        .enumerate()
        .map(|(i, t)| (t.age, t.observation.confidence, true, i))
        .chain(
            chips
                .iter()
                .enumerate()
                .map(|(i, t)| (t.age, t.observation.confidence, false, i)),
        )
        .collect();
    order.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(b.1.total_cmp(&a.1))
            .then(b.2.cmp(&a.2))
    });

    let mut keep_cards = vec![false; cards.len()];
    let mut keep_chips = vec![false; chips.len()];
    let mut kept: Vec<(bool, BBox)> = Vec::with_capacity(order.len());
    for (_, _, is_card, i) in order {
        let (bbox, slot) = if is_card {
            (cards[i].observation.bbox, cards[i].slot)
        } else {
            (chips[i].observation.bbox, chips[i].slot)
        };
        let clash = kept
            .iter()
            .any(|(card, k)| *card != is_card && k.overlap_fraction(&bbox) > max_overlap);
        if clash {
            debug!(
                "{} slot {slot} hidden under an overlapping {}",
                if is_card { "card" } else { "chip" },
                if is_card { "chip stack" } else { "card" }
            );
            continue;
        }
        kept.push((is_card, bbox));
        if is_card {
            keep_cards[i] = true;
        } else {
            keep_chips[i] = true;
        }
    }

    StableState {
        cards: cards.into_iter().zip(keep_cards).filter_map(|(t, k)| k.then_some(t)).collect(),
        chips: chips.into_iter().zip(keep_chips).filter_map(|(t, k)| k.then_some(t)).collect(),
    }
}

/// Card and chip trackers producing the emitted [`StableState`].
#[derive(Clone, Debug)]
pub struct Stabilizer {
    cards: Tracker<CardObservation>,
    chips: Tracker<ChipObservation>,
    max_cross_overlap: f32,
    state: StableState,
}

impl Stabilizer {
    pub fn new(params: StabilizerParams) -> Self {
        Self {
            cards: Tracker::new(params.cards),
            chips: Tracker::new(params.chips),
            max_cross_overlap: params.max_cross_overlap,
            state: StableState::default(),
        }
    }

    /// Fold one frame and return the new stable state.
    pub fn update(
        &mut self,
        cards: Vec<CardObservation>,
        chips: Vec<ChipObservation>,
    ) -> &StableState {
        self.cards.update(cards);
        self.chips.update(chips);
        self.state = merge_categories(
            self.cards.confirmed().cloned().collect(),
            self.chips.confirmed().cloned().collect(),
            self.max_cross_overlap,
        );
        &self.state
    }

    pub fn state(&self) -> &StableState {
        &self.state
    }

    /// Face of the stable card nearest to `p`, used to break template ties.
    pub fn card_hint(&self, p: Point2<f32>) -> Option<CardFace> {
        self.state
            .nearest_card(p, self.cards.params().max_match_distance)
            .map(|t| t.observation.face)
    }

    pub fn card_tracker(&self) -> &Tracker<CardObservation> {
        &self.cards
    }

    pub fn chip_tracker(&self) -> &Tracker<ChipObservation> {
        &self.chips
    }

    /// Forget every track, e.g. after the table mapping changed.
    pub fn reset(&mut self) {
        self.cards.reset();
        self.chips.reset();
        self.state = StableState::default();
    }
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self::new(StabilizerParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blackjack_vision_cards::{Rank, Suit};

    fn card(face: CardFace, x: f32, y: f32, confidence: f32) -> CardObservation {
        let (w, h) = (50.0, 70.0);
        let min = Point2::new(x - w / 2.0, y - h / 2.0);
        let max = Point2::new(x + w / 2.0, y + h / 2.0);
        CardObservation {
            face,
            centroid: Point2::new(x, y),
            bbox: BBox::new(min, max),
            corners: [
                Point2::new(min.x, max.y),
                min,
                Point2::new(max.x, min.y),
                max,
            ],
            confidence,
        }
    }

    fn ten_hearts() -> CardFace {
        CardFace::new(Rank::Ten, Suit::Hearts)
    }

    fn faces(state: &StableState) -> Vec<CardFace> {
        state.cards.iter().map(|t| t.observation.face).collect()
    }

    #[test]
    fn appearance_needs_confirmation() {
        let mut s = Stabilizer::default();
        assert!(s.update(vec![card(ten_hearts(), 100.0, 100.0, 0.9)], vec![]).is_empty());
        let state = s.update(vec![card(ten_hearts(), 102.0, 99.0, 0.9)], vec![]);
        assert_eq!(faces(state), vec![ten_hearts()]);
        assert_eq!(state.cards[0].age, 2);
        assert_eq!(state.cards[0].status, TrackStatus::Confirmed);
    }

    #[test]
    fn one_frame_flicker_is_suppressed() {
        let mut s = Stabilizer::default();
        let face = ten_hearts();
        s.update(vec![card(face, 100.0, 100.0, 0.9)], vec![]);
        s.update(vec![card(face, 100.0, 100.0, 0.9)], vec![]);

        // a spurious extra card for one frame never shows up
        let ghost = card(CardFace::new(Rank::Two, Suit::Clubs), 300.0, 100.0, 0.9);
        let state = s.update(vec![card(face, 100.0, 100.0, 0.9), ghost], vec![]);
        assert_eq!(faces(state), vec![face]);

        // a one-frame dropout keeps the card
        let state = s.update(vec![], vec![]);
        assert_eq!(faces(state), vec![face]);
        assert_eq!(state.cards[0].status, TrackStatus::Missing);
        let state = s.update(vec![card(face, 100.0, 100.0, 0.9)], vec![]);
        assert_eq!(state.cards[0].status, TrackStatus::Confirmed);
        let slot = state.cards[0].slot;

        // a lasting absence removes it
        for _ in 0..3 {
            s.update(vec![], vec![]);
        }
        assert!(s.state().is_empty());
        assert!(s.card_tracker().tracks().iter().all(|t| t.slot != slot));
    }

    #[test]
    fn face_change_is_debounced() {
        let mut s = Stabilizer::default();
        let hearts = ten_hearts();
        let diamonds = CardFace::new(Rank::Ten, Suit::Diamonds);
        s.update(vec![card(hearts, 100.0, 100.0, 0.9)], vec![]);
        s.update(vec![card(hearts, 100.0, 100.0, 0.9)], vec![]);

        let state = s.update(vec![card(diamonds, 100.0, 100.0, 0.9)], vec![]);
        assert_eq!(faces(state), vec![hearts]);
        let state = s.update(vec![card(hearts, 100.0, 100.0, 0.9)], vec![]);
        assert_eq!(faces(state), vec![hearts]);

        s.update(vec![card(diamonds, 100.0, 100.0, 0.9)], vec![]);
        let state = s.update(vec![card(diamonds, 100.0, 100.0, 0.9)], vec![]);
        assert_eq!(faces(state), vec![diamonds]);
    }

    #[test]
    fn low_confidence_and_overlapping_observations_are_filtered() {
        let mut s = Stabilizer::default();
        let weak = card(ten_hearts(), 100.0, 100.0, 0.5);
        for _ in 0..3 {
            s.update(vec![weak.clone()], vec![]);
        }
        assert!(s.state().is_empty());

        let best = card(CardFace::new(Rank::King, Suit::Spades), 300.0, 100.0, 0.95);
        let dup = card(CardFace::new(Rank::King, Suit::Clubs), 305.0, 104.0, 0.8);
        s.update(vec![dup.clone(), best.clone()], vec![]);
        let state = s.update(vec![dup, best], vec![]);
        assert_eq!(faces(state), vec![CardFace::new(Rank::King, Suit::Spades)]);
    }

    #[test]
    fn nearest_tracks_win_matching() {
        let mut tracker: Tracker<CardObservation> = Tracker::default();
        let a = card(ten_hearts(), 100.0, 100.0, 0.9);
        let b = card(CardFace::new(Rank::Ace, Suit::Spades), 160.0, 100.0, 0.9);
        tracker.update(vec![a, b]);
        let slots: Vec<u64> = tracker.tracks().iter().map(|t| t.slot).collect();

        // both shift right; each must keep its own slot
        let a = card(ten_hearts(), 125.0, 100.0, 0.9);
        let b = card(CardFace::new(Rank::Ace, Suit::Spades), 185.0, 100.0, 0.9);
        tracker.update(vec![b, a]);
        let after: Vec<(u64, CardFace)> = tracker
            .tracks()
            .iter()
            .map(|t| (t.slot, t.observation.face))
            .collect();
        assert_eq!(
            after,
            vec![
                (slots[0], ten_hearts()),
                (slots[1], CardFace::new(Rank::Ace, Suit::Spades))
            ]
        );
        assert!(tracker.tracks().iter().all(|t| t.age == 2));
    }

    fn chip_stack(x: f32, y: f32, height: f32) -> ChipObservation {
        ChipObservation {
            centroid: Point2::new(x, y),
            bbox: BBox::new(
                Point2::new(x - 20.0, y - height / 2.0),
                Point2::new(x + 20.0, y + height / 2.0),
            ),
            count: 2,
            denomination: Some("red".into()),
            value_per_chip: 5,
            total_value: 10,
            confidence: 0.9,
            ambiguous: false,
            mean_color: [190, 30, 35],
        }
    }

    #[test]
    fn card_and_chip_never_overlap_in_the_state() {
        let mut s = Stabilizer::default();
        let face = ten_hearts();
        // the card settles first, then a stack is reported right on top of it
        s.update(vec![card(face, 100.0, 100.0, 0.9)], vec![]);
        s.update(vec![card(face, 100.0, 100.0, 0.9)], vec![]);
        for _ in 0..3 {
            let stack = chip_stack(100.0, 105.0, 60.0);
            assert!(stack.bbox.overlap_fraction(&card(face, 100.0, 100.0, 0.9).bbox) > 0.8);
            let state = s.update(vec![card(face, 100.0, 100.0, 0.9)], vec![stack]);
            assert_eq!(faces(state), vec![face]);
            assert!(state.chips.is_empty());
        }
        // the stack is still tracked, only hidden
        assert_eq!(s.chip_tracker().confirmed().count(), 1);

        // a stack beside the card is emitted alongside it
        let mut s = Stabilizer::default();
        for _ in 0..2 {
            s.update(
                vec![card(face, 100.0, 100.0, 0.9)],
                vec![chip_stack(200.0, 100.0, 60.0)],
            );
        }
        assert_eq!(s.state().cards.len(), 1);
        assert_eq!(s.state().chips.len(), 1);
    }

    #[test]
    fn confirmed_card_survives_up_to_the_missing_limit() {
        let params = StabilizerParams::default();
        let limit = params.cards.max_missing_frames;
        let face = ten_hearts();
        let mut s = Stabilizer::new(params);
        s.update(vec![card(face, 100.0, 100.0, 0.9)], vec![]);
        s.update(vec![card(face, 100.0, 100.0, 0.9)], vec![]);

        for k in 1..=limit {
            let state = s.update(vec![], vec![]);
            assert_eq!(faces(state), vec![face], "gone after {k} missing frame(s)");
            assert_eq!(state.cards[0].missing, k);
        }
        assert!(s.update(vec![], vec![]).is_empty());
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut s = Stabilizer::default();
        for _ in 0..2 {
            s.update(
                vec![card(ten_hearts(), 100.0, 100.0, 0.9)],
                vec![chip_stack(200.0, 100.0, 60.0)],
            );
        }
        let json = serde_json::to_string(s.state()).expect("json");
        let back: StableState = serde_json::from_str(&json).expect("state");
        assert_eq!(faces(&back), vec![ten_hearts()]);
        assert_eq!(back.chips[0].observation.total_value, 10);
        assert!(back.cards[0].pending.is_none());
    }

    #[test]
    fn hint_comes_from_nearest_stable_card() {
        let mut s = Stabilizer::default();
        s.update(vec![card(ten_hearts(), 100.0, 100.0, 0.9)], vec![]);
        s.update(vec![card(ten_hearts(), 100.0, 100.0, 0.9)], vec![]);
        assert_eq!(s.card_hint(Point2::new(110.0, 95.0)), Some(ten_hearts()));
        assert_eq!(s.card_hint(Point2::new(400.0, 400.0)), None);
        s.reset();
        assert_eq!(s.card_hint(Point2::new(100.0, 100.0)), None);
    }
}
