use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::Player;

/// A player's complete observational history from the start of the game up to
/// a decision point: the owning player plus an append-only ordered sequence of
/// `(public, private)` observation pairs.
///
/// Two world states that produce equal infostates for a player are
/// indistinguishable to that player, so strategies are keyed on this type and
/// nothing else. Equality and hashing are defined over `(player, sequence)`;
/// the hash is folded incrementally on [`InfoState::append`] since solvers ask
/// for it at every table lookup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InfoState<O> {
    player: Player,
    log: Vec<(O, O)>,
    hash_cache: u64,
}

impl<O: Hash> InfoState<O> {
    pub fn new(player: Player) -> Self {
        let mut hasher = DefaultHasher::new();
        player.hash(&mut hasher);
        Self {
            player,
            log: Vec::new(),
            hash_cache: hasher.finish(),
        }
    }

    /// Extend the sequence by one `(public, private)` observation pair.
    /// Observations are only ever appended, never removed or reordered.
    pub fn append(&mut self, public: O, private: O) {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.hash_cache);
        public.hash(&mut hasher);
        private.hash(&mut hasher);
        self.hash_cache = hasher.finish();
        self.log.push((public, private));
    }

    pub fn player(&self) -> Player {
        self.player
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&(O, O)> {
        self.log.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (O, O)> {
        self.log.iter()
    }

    pub fn latest(&self) -> Option<&(O, O)> {
        self.log.last()
    }
}

impl<O: Eq> PartialEq for InfoState<O> {
    fn eq(&self, other: &Self) -> bool {
        self.player == other.player && self.log == other.log
    }
}

impl<O: Eq> Eq for InfoState<O> {}

impl<O> Hash for InfoState<O> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_cache);
    }
}

/// The public companion of [`InfoState`]: only the observations every player
/// received, shared by all of them, with no owner tag.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PublicState<O> {
    log: Vec<O>,
    hash_cache: u64,
}

impl<O: Hash> PublicState<O> {
    pub fn new() -> Self {
        Self {
            log: Vec::new(),
            hash_cache: 0,
        }
    }

    pub fn append(&mut self, public: O) {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.hash_cache);
        public.hash(&mut hasher);
        self.hash_cache = hasher.finish();
        self.log.push(public);
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&O> {
        self.log.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, O> {
        self.log.iter()
    }
}

impl<O: Eq> PartialEq for PublicState<O> {
    fn eq(&self, other: &Self) -> bool {
        self.log == other.log
    }
}

impl<O: Eq> Eq for PublicState<O> {}

impl<O> Hash for PublicState<O> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_cache);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::{InfoState, PublicState};
    use crate::Player;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equal_append_sequences_are_equal_and_hash_equal() {
        let mut a = InfoState::new(Player::Alex);
        let mut b = InfoState::new(Player::Alex);

        for (public, private) in [("deal", "king"), ("check", "-"), ("bet", "-")] {
            a.append(public, private);
            b.append(public, private);
        }

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.len(), 3);
        assert_eq!(a.get(1), Some(&("check", "-")));
        assert_eq!(a.latest(), Some(&("bet", "-")));
    }

    #[test]
    fn test_player_distinguishes_infostates() {
        let a = InfoState::<&str>::new(Player::Alex);
        let b = InfoState::<&str>::new(Player::Bob);

        assert_ne!(a, b);
        assert_ne!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_observation_order_matters() {
        let mut a = InfoState::new(Player::Alex);
        let mut b = InfoState::new(Player::Alex);
        a.append("x", "-");
        a.append("y", "-");
        b.append("y", "-");
        b.append("x", "-");

        assert_ne!(a, b);
    }

    #[test]
    fn test_public_private_split_distinguishes() {
        let mut a = InfoState::new(Player::Alex);
        let mut b = InfoState::new(Player::Alex);
        a.append("x", "y");
        b.append("y", "x");

        assert_ne!(a, b);
    }

    #[test]
    fn test_public_state_sequences() {
        let mut a = PublicState::new();
        let mut b = PublicState::new();
        assert_eq!(a, b);

        a.append("bet");
        assert_ne!(a, b);

        b.append("bet");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.iter().count(), 1);
    }
}
