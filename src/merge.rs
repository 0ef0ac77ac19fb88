//! Reassembly of ordered sequences split over several datagrams.
//!
//! A long identifier list (route links, lane-switch lines) may be cut into
//! fragments that arrive in any order and may overlap. A [`ReassemblySession`]
//! grows a `body` from the fragments that line up with its ends and parks the
//! rest; [`ReassemblySession::result`] retries the parked fragments until nothing
//! more fits.
//!
//! ## Merge rule
//!
//! For a fragment `f` and body `b`:
//!
//! - **front:** `b[0]` occurs in `f` at `head` and the elements after `head`
//!   agree with `b[1..]` (as far as both go): `f[..head]` is prepended.
//! - **rear:** `b[last]` occurs in `f` at `tail` and the elements before `tail`
//!   agree with the end of `b` walking backwards: `f[tail + 1..]` is appended.
//! - Both are checked against the body before the call and may both apply.
//! - Otherwise the fragment merges as a no-op if all its elements are already in
//!   `b`, and is rejected if not.
//!
//! Values are assumed not to repeat inside one sequence; repeated values can
//! produce false merges.
//!
//! ## Example
//!
//! ```
//! use ehpdecode::merge::ReassemblySession;
//!
//! let mut session = ReassemblySession::new();
//! session.add(vec![2, 3, 4, 5, 6, 7]);
//! session.add(vec![9]);
//! session.add(vec![1]);
//! session.add(vec![8, 9]);
//! session.add(vec![8, 9, 10]);
//! session.add(vec![7, 8]);
//! session.add(vec![4, 5, 6]);
//! assert_eq!(session.result(), vec![2, 3, 4, 5, 6, 7, 8, 9, 10, 1]);
//! ```

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Whether a session has a body yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Seeded,
}

/// One bundle's worth of fragments being stitched together.
#[derive(Debug, Clone, PartialEq)]
pub struct ReassemblySession<T = u32> {
    body: Vec<T>,
    pending: Vec<Vec<T>>,
}

impl<T> Default for ReassemblySession<T> {
    fn default() -> Self {
        ReassemblySession {
            body: Vec::new(),
            pending: Vec::new(),
        }
    }
}

impl<T: PartialEq + Clone> ReassemblySession<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.body.is_empty() {
            SessionState::Empty
        } else {
            SessionState::Seeded
        }
    }

    pub fn body(&self) -> &[T] {
        &self.body
    }

    /// Fragments that have not lined up with the body yet, in arrival order.
    pub fn pending(&self) -> &[Vec<T>] {
        &self.pending
    }

    /// Feed one fragment. Empty fragments are dropped; the first non-empty one
    /// seeds the body.
    pub fn add(&mut self, fragment: Vec<T>) {
        if fragment.is_empty() {
            return;
        }
        if !self.try_merge(&fragment) {
            self.pending.push(fragment);
        }
    }

    /// Merge `fragment` into the body if it lines up. Returns `false` when the
    /// fragment holds elements that could not be placed.
    pub fn try_merge(&mut self, fragment: &[T]) -> bool {
        merge_into(&mut self.body, fragment)
    }

    /// Reconcile parked fragments, then return the body followed by whatever
    /// still does not fit, in arrival order.
    ///
    /// Calling it again without an intervening [`add`](Self::add) returns the
    /// same sequence.
    pub fn result(&mut self) -> Vec<T> {
        loop {
            let body = &mut self.body;
            let merged = self.pending.iter().position(|f| merge_into(body, f));
            match merged {
                // The scan restarts from the front after every merge.
                Some(i) => {
                    self.pending.remove(i);
                }
                None => break,
            }
        }
        let mut out = self.body.clone();
        for fragment in &self.pending {
            out.extend_from_slice(fragment);
        }
        out
    }
}

fn merge_into<T: PartialEq + Clone>(body: &mut Vec<T>, fragment: &[T]) -> bool {
    if fragment.is_empty() {
        return true;
    }
    let (Some(first), Some(last)) = (body.first(), body.last()) else {
        *body = fragment.to_vec();
        return true;
    };
    let n = body.len();

    let front = fragment.iter().position(|v| v == first).and_then(|head| {
        let span = (fragment.len() - 1 - head).min(n - 1);
        (1..=span)
            .all(|i| fragment[head + i] == body[i])
            .then(|| fragment[..head].to_vec())
    });
    let rear = fragment.iter().position(|v| v == last).and_then(|tail| {
        let span = tail.min(n - 1);
        (1..=span)
            .all(|i| fragment[tail - i] == body[n - 1 - i])
            .then(|| fragment[tail + 1..].to_vec())
    });

    if front.is_none() && rear.is_none() {
        return fragment.iter().all(|v| body.contains(v));
    }
    if let Some(mut front) = front {
        front.append(body);
        *body = front;
    }
    if let Some(rear) = rear {
        body.extend(rear);
    }
    true
}

/// A session plus the part indices that fed it.
#[derive(Debug, Clone)]
struct Bundle<T> {
    session: ReassemblySession<T>,
    parts: BTreeSet<u16>,
}

impl<T> Default for Bundle<T> {
    fn default() -> Self {
        Bundle {
            session: ReassemblySession::default(),
            parts: BTreeSet::new(),
        }
    }
}

/// Sessions keyed by a correlation key, typically the multi-part bundle id.
///
/// Sessions fed through [`add_part`](Self::add_part) close themselves once
/// every announced part has arrived; otherwise the owner calls
/// [`finish`](Self::finish) or [`abandon`](Self::abandon).
#[derive(Debug, Clone)]
pub struct BundleReassembler<K, T = u32> {
    sessions: HashMap<K, Bundle<T>>,
}

impl<K, T> Default for BundleReassembler<K, T> {
    fn default() -> Self {
        BundleReassembler {
            sessions: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, T: PartialEq + Clone> BundleReassembler<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: K, fragment: Vec<T>) {
        self.sessions.entry(key).or_default().session.add(fragment);
    }

    /// Feed part `part_index` of a bundle announced as `part_count` parts.
    ///
    /// Parts may arrive in any order and repeats count once. When the number of
    /// distinct indices below `part_count` reaches `part_count` the session is
    /// finished and its reconstruction returned.
    pub fn add_part(&mut self, key: K, part_index: u16, part_count: u16, fragment: Vec<T>) -> Option<Vec<T>>
    where
        K: Clone,
    {
        let bundle = self.sessions.entry(key.clone()).or_default();
        bundle.session.add(fragment);
        if part_index < part_count {
            bundle.parts.insert(part_index);
        }
        if bundle.parts.len() < usize::from(part_count) {
            return None;
        }
        self.finish(&key)
    }

    /// Current reconstruction for `key`, or `None` if nothing arrived for it.
    pub fn result(&mut self, key: &K) -> Option<Vec<T>> {
        self.sessions.get_mut(key).map(|b| b.session.result())
    }

    /// Final reconstruction for `key`; the session is dropped.
    pub fn finish(&mut self, key: &K) -> Option<Vec<T>> {
        self.sessions.remove(key).map(|mut b| b.session.result())
    }

    pub fn abandon(&mut self, key: &K) -> bool {
        self.sessions.remove(key).is_some()
    }

    pub fn session(&self, key: &K) -> Option<&ReassemblySession<T>> {
        self.sessions.get(key).map(|b| &b.session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Keys of the sessions still open.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.sessions.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fragment_seeds_body() {
        let mut s = ReassemblySession::new();
        assert_eq!(s.state(), SessionState::Empty);
        s.add(vec![]);
        assert_eq!(s.state(), SessionState::Empty);
        s.add(vec![5, 6]);
        assert_eq!(s.state(), SessionState::Seeded);
        assert_eq!(s.body(), &[5, 6]);
    }

    #[test]
    fn front_and_rear_apply_together() {
        let mut s = ReassemblySession::new();
        s.add(vec![3, 4]);
        assert!(s.try_merge(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(s.body(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn single_element_body_takes_both_sides() {
        let mut s = ReassemblySession::new();
        s.add(vec![7]);
        assert!(s.try_merge(&[6, 7, 8]));
        assert_eq!(s.body(), &[6, 7, 8]);
    }

    #[test]
    fn disagreeing_overlap_is_rejected() {
        let mut s = ReassemblySession::new();
        s.add(vec![1, 2, 3]);
        assert!(!s.try_merge(&[0, 1, 9]));
        assert!(!s.try_merge(&[4, 3, 5]));
        assert_eq!(s.body(), &[1, 2, 3]);
    }

    #[test]
    fn subset_is_a_no_op_merge() {
        let mut s = ReassemblySession::new();
        s.add(vec![1, 2, 3, 4]);
        assert!(s.try_merge(&[3, 2]));
        assert_eq!(s.body(), &[1, 2, 3, 4]);
        assert!(s.pending().is_empty());
    }

    #[test]
    fn unplaced_fragments_trail_the_body() {
        let mut s = ReassemblySession::new();
        s.add(vec![1, 2]);
        s.add(vec![10, 11]);
        s.add(vec![20]);
        assert_eq!(s.pending().len(), 2);
        assert_eq!(s.result(), vec![1, 2, 10, 11, 20]);
        assert_eq!(s.result(), vec![1, 2, 10, 11, 20]);
    }
}
