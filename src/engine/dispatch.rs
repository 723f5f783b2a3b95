//! Dispatch planning.

use crate::backend::DispatchRange;

/// Cover `[0, global)` with sub-dispatches whose sizes divide evenly by
/// their work-group size.
///
/// Starting from `local`, each step dispatches the largest multiple of the
/// current group size that fits the remainder, then halves the group size.
/// Group size 1 always finishes the job, so the plan has at most
/// `log2(local) + 1` entries, each with a smaller group size than the last.
pub fn split_dispatch(global: usize, local: usize) -> Vec<DispatchRange> {
    let mut plan = Vec::new();
    let mut local = local.max(1);
    let mut offset = 0;
    let mut remaining = global;

    while remaining > 0 {
        let slice = remaining - remaining % local;
        if slice > 0 {
            plan.push(DispatchRange {
                offset,
                global: slice,
                local,
            });
            offset += slice;
            remaining -= slice;
        }
        local /= 2;
        if local == 0 {
            break;
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_partition(global: usize, local: usize) {
        let plan = split_dispatch(global, local);
        let mut expected = 0;
        for window in plan.windows(2) {
            assert!(window[1].local < window[0].local);
        }
        for range in &plan {
            assert_eq!(range.offset, expected);
            assert_eq!(range.global % range.local, 0);
            assert!(range.global > 0);
            expected = range.end();
        }
        assert_eq!(expected, global);
        assert!(plan.len() <= local.max(1).ilog2() as usize + 1);
    }

    #[test]
    fn test_even_domain_is_one_dispatch() {
        let plan = split_dispatch(1024, 256);
        assert_eq!(
            plan,
            vec![DispatchRange {
                offset: 0,
                global: 1024,
                local: 256
            }]
        );
    }

    #[test]
    fn test_uneven_domain() {
        // 1000 = 768 (256) + 128 (128) + 64 (64) + 32 (32) + 8 (8)
        let plan = split_dispatch(1000, 256);
        let sizes: Vec<(usize, usize)> = plan.iter().map(|r| (r.global, r.local)).collect();
        assert_eq!(sizes, vec![(768, 256), (128, 128), (64, 64), (32, 32), (8, 8)]);
    }

    #[test]
    fn test_partitions_cover_domain() {
        for &(g, l) in &[(1, 256), (7, 4), (255, 256), (257, 256), (640 * 480, 256), (99, 1), (13, 3)] {
            check_partition(g, l);
        }
    }

    #[test]
    fn test_empty_domain() {
        assert!(split_dispatch(0, 64).is_empty());
    }

    #[test]
    fn test_domain_smaller_than_group() {
        let plan = split_dispatch(5, 64);
        assert_eq!(plan.len(), 2);
        assert_eq!((plan[0].global, plan[0].local), (4, 4));
        assert_eq!((plan[1].global, plan[1].local), (1, 1));
    }
}
