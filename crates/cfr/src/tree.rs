use fosg::{Game, GameMove, Move, Player, Stochasticity};

/// Hook points for [`traverse`]. Implementors thread a `Data` value along
/// every live branch of the walk; [`TreeVisitor::child`] derives the child's
/// data from its parent's, which is where solvers extend infostates and
/// multiply reach probabilities.
///
/// All hooks default to no-ops except `child`, and the expansion strategy
/// defaults to every legal move. Overriding [`TreeVisitor::children`] to
/// return a single move turns the walk into a trajectory, which is the seam a
/// sampling variant would use.
pub trait TreeVisitor<G: Game> {
    type Data;

    /// Called once with the root world before anything is expanded.
    fn root(&mut self, _world: &G::World) {}

    /// Called when a world is popped for expansion, before its children.
    fn pre_child(&mut self, _world: &G::World, _data: &mut Self::Data) {}

    /// Called for every generated child; returns the data carried into it.
    /// `parent` is `None` in single-trajectory mode, where the parent world
    /// has already been moved into the child.
    fn child(
        &mut self,
        data: &mut Self::Data,
        mv: &GameMove<G>,
        parent: Option<&G::World>,
        child: &G::World,
    ) -> Self::Data;

    /// Called after a world's children have been generated.
    fn post_child(&mut self, _world: &G::World) {}

    /// The moves to expand at `world`.
    fn children(&mut self, env: &G, world: &G::World) -> Vec<GameMove<G>> {
        all_moves(env, world)
    }
}

/// Every legal move at `world`: the chance support at chance states, the
/// active player's actions otherwise.
pub fn all_moves<G: Game>(env: &G, world: &G::World) -> Vec<GameMove<G>> {
    if G::STOCHASTICITY == Stochasticity::Chance && env.active_player(world) == Player::Chance {
        env.chance_actions(world)
            .into_iter()
            .map(Move::Chance)
            .collect()
    } else {
        env.actions(env.active_player(world), world)
            .into_iter()
            .map(Move::Action)
            .collect()
    }
}

/// Depth-first walk of the game tree rooted at `root`.
///
/// The walk runs on an explicit LIFO stack of `(world, data)` pairs, so a
/// node's entire subtree is expanded before any of its siblings: whoever
/// records nodes in `pre_child` order gets children after parents, which is
/// what post-order value propagation needs. Terminal children still fire the
/// `child` hook but are not pushed.
///
/// With `single_trajectory` set the parent world is moved, not cloned, into
/// its only child; the caller guarantees one move per world. The post-child
/// hook then fires before the move, since the parent no longer exists after
/// it.
pub fn traverse<G: Game, V: TreeVisitor<G>>(
    env: &G,
    root: &G::World,
    visitor: &mut V,
    root_data: V::Data,
    single_trajectory: bool,
) {
    visitor.root(root);

    let mut stack: Vec<(G::World, V::Data)> = vec![(root.clone(), root_data)];
    while let Some((world, mut data)) = stack.pop() {
        visitor.pre_child(&world, &mut data);
        let moves = visitor.children(env, &world);

        if single_trajectory {
            debug_assert!(moves.len() <= 1, "single trajectory with branching moves");
            visitor.post_child(&world);
            if let Some(mv) = moves.into_iter().next() {
                let mut next = world;
                env.transition(&mut next, &mv);
                let child_data = visitor.child(&mut data, &mv, None, &next);
                if !env.is_terminal(&next) {
                    stack.push((next, child_data));
                }
            }
        } else {
            for mv in &moves {
                let mut child = world.clone();
                env.transition(&mut child, mv);
                let child_data = visitor.child(&mut data, mv, Some(&world), &child);
                if !env.is_terminal(&child) {
                    stack.push((child, child_data));
                }
            }
            visitor.post_child(&world);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fosg::gamestates::kuhn_poker::{Card, Deal, KPAction, KPState, KuhnPoker};

    #[derive(Default)]
    struct NodeCounter {
        game: KuhnPoker,
        roots: usize,
        chance: usize,
        decision: usize,
        terminal: usize,
        max_depth: usize,
    }

    impl NodeCounter {
        fn classify(&mut self, world: &KPState) {
            if self.game.is_terminal(world) {
                self.terminal += 1;
            } else if self.game.active_player(world) == Player::Chance {
                self.chance += 1;
            } else {
                self.decision += 1;
            }
        }
    }

    impl TreeVisitor<KuhnPoker> for NodeCounter {
        type Data = usize;

        fn root(&mut self, world: &KPState) {
            self.roots += 1;
            self.classify(world);
        }

        fn child(
            &mut self,
            depth: &mut usize,
            _mv: &GameMove<KuhnPoker>,
            parent: Option<&KPState>,
            child: &KPState,
        ) -> usize {
            assert!(parent.is_some());
            self.classify(child);
            self.max_depth = self.max_depth.max(*depth + 1);
            *depth + 1
        }
    }

    #[test]
    fn test_full_kuhn_tree_shape() {
        let game = KuhnPoker;
        let root = game.initial_world();
        let mut counter = NodeCounter::default();

        traverse(&game, &root, &mut counter, 0, false);

        // 1 root deal + 3 second deals, 6 deals x 4 decision nodes, 6 x 5 terminals
        assert_eq!(counter.roots, 1);
        assert_eq!(counter.chance, 4);
        assert_eq!(counter.decision, 24);
        assert_eq!(counter.terminal, 30);
        // two deals plus the longest betting line check-bet-{check,bet}
        assert_eq!(counter.max_depth, 5);
    }

    /// Forces one fixed line through the game to exercise trajectory mode.
    struct FixedLine {
        script: Vec<GameMove<KuhnPoker>>,
        visited: usize,
    }

    impl TreeVisitor<KuhnPoker> for FixedLine {
        type Data = ();

        fn child(
            &mut self,
            _data: &mut (),
            _mv: &GameMove<KuhnPoker>,
            parent: Option<&KPState>,
            _child: &KPState,
        ) {
            assert!(parent.is_none(), "trajectory mode moves the parent");
            self.visited += 1;
        }

        fn children(&mut self, _env: &KuhnPoker, _world: &KPState) -> Vec<GameMove<KuhnPoker>> {
            match self.script.pop() {
                Some(mv) => vec![mv],
                None => Vec::new(),
            }
        }
    }

    #[test]
    fn test_single_trajectory_moves_the_world() {
        let game = KuhnPoker;
        let mut script = vec![
            Move::Chance(Deal {
                player: Player::Alex,
                card: Card::Queen,
            }),
            Move::Chance(Deal {
                player: Player::Bob,
                card: Card::King,
            }),
            Move::Action(KPAction::Bet),
            Move::Action(KPAction::Bet),
        ];
        script.reverse();
        let mut visitor = FixedLine { script, visited: 0 };

        traverse(&game, &game.initial_world(), &mut visitor, (), true);

        assert_eq!(visitor.visited, 4);
        assert!(visitor.script.is_empty());
    }
}
