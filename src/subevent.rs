//! Partition of a selection's particles into two independent sub-events

use crate::{
    config::SubeventPolicy, event::Particle, random::RandomGenerator, selection::SubeventHalf,
};

/// Assign each member of a selection to a sub-event half
///
/// The output is aligned with `members`. Members which the policy leaves
/// out (particles inside the η gap, neutral particles when splitting by
/// charge, everyone when sub-events are disabled) are assigned `None`.
///
/// Random halves are built by shuffling the members and alternating halves,
/// so their sizes differ by at most one.
///
pub fn partition(
    policy: SubeventPolicy,
    members: &[&Particle],
    rng: &mut RandomGenerator,
) -> Vec<Option<SubeventHalf>> {
    match policy {
        SubeventPolicy::None => vec![None; members.len()],
        SubeventPolicy::Random => {
            let mut order = (0..members.len()).collect::<Vec<_>>();
            rng.shuffle(&mut order);
            let mut halves = vec![None; members.len()];
            for (rank, member) in order.into_iter().enumerate() {
                halves[member] = Some(SubeventHalf::ALL[rank % 2]);
            }
            halves
        }
        SubeventPolicy::Pseudorapidity { gap } => members
            .iter()
            .map(|particle| {
                if particle.eta > gap / 2. {
                    Some(SubeventHalf::A)
                } else if particle.eta < -gap / 2. {
                    Some(SubeventHalf::B)
                } else {
                    None
                }
            })
            .collect(),
        SubeventPolicy::Charge => members
            .iter()
            .map(|particle| match particle.charge {
                c if c > 0 => Some(SubeventHalf::A),
                c if c < 0 => Some(SubeventHalf::B),
                _ => None,
            })
            .collect(),
    }
}
