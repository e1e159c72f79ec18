//! Zone neighbour graph and the BFS drop schedule.

use std::collections::VecDeque;

use crate::geometry::Rect;

/// Pixel gap below which two non-overlapping zones count as neighbours.
pub const ADJACENCY_GAP_PX: f64 = 40.0;

/// Builds the undirected neighbour graph over zone indices.
///
/// With rectangles, adjacency is geometric ([`Rect::is_adjacent`]). Without
/// geometry the zones are taken in list order as a chain (`i ↔ i+1`), which
/// is how operators enumerate the strips of a tapered panel. Neighbour lists
/// are kept in ascending index order so traversal is deterministic.
#[must_use]
pub fn build_neighbor_graph(zone_count: usize, rects: Option<&[Rect]>) -> Vec<Vec<usize>> {
    let mut graph = vec![Vec::new(); zone_count];
    match rects {
        Some(rects) => {
            for i in 0..zone_count {
                for j in i + 1..zone_count {
                    if rects[i].is_adjacent(&rects[j], ADJACENCY_GAP_PX) {
                        graph[i].push(j);
                        graph[j].push(i);
                    }
                }
            }
            for neighbors in &mut graph {
                neighbors.sort_unstable();
            }
        }
        None => {
            for i in 0..zone_count.saturating_sub(1) {
                graph[i].push(i + 1);
                graph[i + 1].push(i);
            }
            for neighbors in &mut graph {
                neighbors.sort_unstable();
            }
        }
    }
    graph
}

/// BFS traversal order and the drop-off parent chosen for each zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfsSchedule {
    /// Zones in visit order, root first.
    pub order: Vec<usize>,
    /// Drop-off parent per zone (`None` for the root and unreachable zones).
    pub parent: Vec<Option<usize>>,
}

impl BfsSchedule {
    /// Zones the traversal never reached, ascending.
    #[must_use]
    pub fn unreachable(&self, zone_count: usize) -> Vec<usize> {
        let mut seen = vec![false; zone_count];
        for &zone in &self.order {
            seen[zone] = true;
        }
        (0..zone_count).filter(|&z| !seen[z]).collect()
    }
}

/// Breadth-first traversal from `root` with drop-off parent selection.
///
/// When a zone is discovered, its parent is the best already-visited
/// neighbour: thickest first, then smallest ply-count difference, then
/// lowest index. The discovering frontier zone is the fallback (it is
/// always a visited neighbour, so the fallback only documents intent).
#[must_use]
pub fn bfs_schedule(graph: &[Vec<usize>], root: usize, thickness: &[usize]) -> BfsSchedule {
    let zone_count = graph.len();
    let mut visited = vec![false; zone_count];
    let mut parent = vec![None; zone_count];
    let mut order = Vec::with_capacity(zone_count);
    let mut queue = VecDeque::new();

    visited[root] = true;
    order.push(root);
    queue.push_back(root);

    while let Some(current) = queue.pop_front() {
        for &next in &graph[current] {
            if visited[next] {
                continue;
            }
            visited[next] = true;

            let chosen = graph[next]
                .iter()
                .filter(|&&candidate| visited[candidate] && candidate != next)
                .min_by(|&&a, &&b| {
                    thickness[b]
                        .cmp(&thickness[a])
                        .then_with(|| {
                            thickness[a]
                                .abs_diff(thickness[next])
                                .cmp(&thickness[b].abs_diff(thickness[next]))
                        })
                        .then(a.cmp(&b))
                })
                .copied()
                .unwrap_or(current);

            parent[next] = Some(chosen);
            order.push(next);
            queue.push_back(next);
        }
    }

    BfsSchedule { order, parent }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_graph_without_geometry() {
        let graph = build_neighbor_graph(4, None);
        assert_eq!(graph, vec![vec![1], vec![0, 2], vec![1, 3], vec![2]]);
    }

    #[test]
    fn test_chain_bfs_parents() {
        let graph = build_neighbor_graph(3, None);
        let schedule = bfs_schedule(&graph, 0, &[36, 32, 24]);
        assert_eq!(schedule.order, vec![0, 1, 2]);
        assert_eq!(schedule.parent, vec![None, Some(0), Some(1)]);
        assert!(schedule.unreachable(3).is_empty());
    }

    #[test]
    fn test_parent_prefers_thickest_visited_neighbor() {
        // Zone 3 touches both 1 (thick) and 2 (thin); both are visited by
        // the time 3 is discovered from 1.
        let graph = vec![
            vec![1, 2],    // 0
            vec![0, 3],    // 1
            vec![0, 3],    // 2
            vec![1, 2],    // 3
        ];
        let schedule = bfs_schedule(&graph, 0, &[40, 36, 20, 18]);
        assert_eq!(schedule.parent[3], Some(1));
    }

    #[test]
    fn test_parent_tie_breaks_on_ply_difference_then_index() {
        // Zones 1 and 2 have equal thickness; zone 3 is closer to 2's count.
        let graph = vec![
            vec![1, 2],
            vec![0, 3],
            vec![0, 3],
            vec![1, 2],
        ];
        let equal = bfs_schedule(&graph, 0, &[40, 30, 30, 28]);
        // Equal thickness and equal difference → lowest index wins.
        assert_eq!(equal.parent[3], Some(1));
    }

    #[test]
    fn test_unreachable_zones_are_reported() {
        let rects = [
            Rect { x: 0.0, y: 0.0, w: 100.0, h: 100.0 },
            Rect { x: 110.0, y: 0.0, w: 100.0, h: 100.0 },
            Rect { x: 1000.0, y: 1000.0, w: 50.0, h: 50.0 },
        ];
        let graph = build_neighbor_graph(3, Some(&rects));
        let schedule = bfs_schedule(&graph, 0, &[36, 32, 24]);
        assert_eq!(schedule.unreachable(3), vec![2]);
    }

    #[test]
    fn test_bfs_order_is_deterministic() {
        let graph = build_neighbor_graph(5, None);
        let a = bfs_schedule(&graph, 2, &[30, 30, 40, 30, 30]);
        let b = bfs_schedule(&graph, 2, &[30, 30, 40, 30, 30]);
        assert_eq!(a, b);
        assert_eq!(a.order, vec![2, 1, 3, 0, 4]);
    }
}
