//! Maximum bipartite matching between requested and available items
//!
//! An edge joins a requested item to an available item when the available
//! item satisfies the request. A request list is satisfiable when the
//! maximum matching covers every requested item, so each available item
//! serves at most one request and the verdict never depends on list order.
//! Matching uses augmenting paths (Kuhn), O(V * E).

/// Assignment of every requested item to a distinct available item.
///
/// `result[i]` is the index in `available` bound to `requested[i]`, or
/// `None` when no complete assignment exists.
pub fn assignment<R, A>(
    requested: &[R],
    available: &[A],
    satisfies: impl Fn(&R, &A) -> bool,
) -> Option<Vec<usize>> {
    if requested.len() > available.len() {
        return None;
    }

    let adjacency: Vec<Vec<usize>> = requested
        .iter()
        .map(|r| {
            available
                .iter()
                .enumerate()
                .filter(|(_, a)| satisfies(r, a))
                .map(|(i, _)| i)
                .collect()
        })
        .collect();

    let owner = maximum_matching(&adjacency, available.len());
    let mut bound = vec![None; requested.len()];
    for (right, left) in owner.iter().enumerate() {
        if let Some(left) = left {
            bound[*left] = Some(right);
        }
    }
    bound.into_iter().collect()
}

/// Whether every requested item can be bound to a distinct available item
pub fn is_fully_matched<R, A>(
    requested: &[R],
    available: &[A],
    satisfies: impl Fn(&R, &A) -> bool,
) -> bool {
    assignment(requested, available, satisfies).is_some()
}

/// Owner (left index) of each right vertex in a maximum matching
fn maximum_matching(adjacency: &[Vec<usize>], right_count: usize) -> Vec<Option<usize>> {
    let mut owner = vec![None; right_count];
    for left in 0..adjacency.len() {
        let mut visited = vec![false; right_count];
        augment(left, adjacency, &mut owner, &mut visited);
    }
    owner
}

fn augment(
    left: usize,
    adjacency: &[Vec<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &right in &adjacency[left] {
        if visited[right] {
            continue;
        }
        visited[right] = true;

        let free = match owner[right] {
            None => true,
            Some(other) => augment(other, adjacency, owner, visited),
        };
        if free {
            owner[right] = Some(left);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at_least(requested: &u32, available: &u32) -> bool {
        available >= requested
    }

    #[test]
    fn test_greedy_order_does_not_matter() {
        // A greedy first-fit would bind 100 to 1000 and starve 200
        let requested = [100, 200];
        let available = [1000, 100];
        assert_eq!(
            assignment(&requested, &available, at_least),
            Some(vec![1, 0])
        );
    }

    #[test]
    fn test_one_item_cannot_serve_two_requests() {
        assert!(!is_fully_matched(&[10, 10], &[50], at_least));
        assert!(!is_fully_matched(&[10, 10], &[50, 5], at_least));
        assert!(is_fully_matched(&[10, 10], &[50, 10], at_least));
    }

    #[test]
    fn test_empty_request_always_matches() {
        let none: [u32; 0] = [];
        assert!(is_fully_matched(&none, &none, at_least));
        assert!(is_fully_matched(&none, &[1], at_least));
        assert!(!is_fully_matched(&[1], &none, at_least));
    }

    #[test]
    fn test_augmenting_chain() {
        // 0 -> {0,1}, 1 -> {0}, 2 -> {1,2}: requires two reassignments
        let edges = [vec![0usize, 1], vec![0], vec![1, 2]];
        let requested = [0usize, 1, 2];
        let available = [0usize, 1, 2];
        let bound = assignment(&requested, &available, |r, a| edges[*r].contains(a)).unwrap();
        assert_eq!(bound, vec![1, 0, 2]);
    }

    proptest! {
        #[test]
        fn prop_permutation_invariant(
            requested in prop::collection::vec(0u32..2000, 0..6),
            available in prop::collection::vec(0u32..2000, 0..8),
            seed in any::<u64>(),
        ) {
            let expected = is_fully_matched(&requested, &available, at_least);

            let mut req = requested.clone();
            let mut avail = available.clone();
            req.reverse();
            let len = avail.len().max(1);
            avail.rotate_left((seed as usize) % len);

            prop_assert_eq!(is_fully_matched(&req, &avail, at_least), expected);
        }

        #[test]
        fn prop_assignment_is_injective(
            requested in prop::collection::vec(0u32..500, 1..6),
            available in prop::collection::vec(0u32..500, 1..8),
        ) {
            if let Some(bound) = assignment(&requested, &available, at_least) {
                let mut seen = bound.clone();
                seen.sort_unstable();
                seen.dedup();
                prop_assert_eq!(seen.len(), bound.len());
                for (r, a) in bound.iter().enumerate() {
                    prop_assert!(available[*a] >= requested[r]);
                }
            }
        }
    }
}
