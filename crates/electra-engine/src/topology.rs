use std::collections::{HashMap, HashSet, VecDeque};

use electra_core::{GridModel, WireRecord};
use petgraph::graph::{NodeIndex, UnGraph};

/// A branch reduced to its terminals, in model bus positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchEnds {
    pub from: usize,
    pub to: usize,
}

/// Electrical islands of the energizable part of a model.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// idtag -> position in `model_data.bus`, active buses only.
    pub bus_index: HashMap<String, usize>,
    /// Each island lists bus positions in discovery order.
    pub islands: Vec<Vec<usize>>,
    island_of: HashMap<usize, usize>,
}

impl Topology {
    pub fn island_of(&self, bus: usize) -> Option<usize> {
        self.island_of.get(&bus).copied()
    }

    /// Terminals of a branch when both ends are active buses.
    pub fn ends(&self, from: Option<&str>, to: Option<&str>) -> Option<BranchEnds> {
        let from = *self.bus_index.get(from?)?;
        let to = *self.bus_index.get(to?)?;
        Some(BranchEnds { from, to })
    }
}

/// Active buses are nodes and active branches between two active buses are
/// edges. Each connected component is one island.
pub fn find_islands(model: &GridModel) -> Topology {
    let data = &model.model_data;
    let mut graph = UnGraph::<usize, ()>::new_undirected();
    let mut topology = Topology::default();
    let mut nodes: HashMap<usize, NodeIndex> = HashMap::new();

    for (pos, bus) in data.bus.iter().enumerate() {
        let Some(tag) = bus.idtag().filter(|_| bus.is_active()) else {
            continue;
        };
        if topology.bus_index.contains_key(tag) {
            continue;
        }
        topology.bus_index.insert(tag.to_string(), pos);
        nodes.insert(pos, graph.add_node(pos));
    }

    let line_ends = data
        .line
        .iter()
        .filter(|l| l.is_active())
        .map(|l| (l.bus_from.as_deref(), l.bus_to.as_deref()));
    let trafo_ends = data
        .transformer2w
        .iter()
        .filter(|t| t.is_active())
        .map(|t| (t.bus_from.as_deref(), t.bus_to.as_deref()));
    for (from, to) in line_ends.chain(trafo_ends) {
        if let Some(ends) = topology.ends(from, to) {
            graph.add_edge(nodes[&ends.from], nodes[&ends.to], ());
        }
    }

    let mut visited = HashSet::new();
    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let island_id = topology.islands.len();
        let mut members = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            members.push(graph[node]);
            for neighbor in graph.neighbors(node) {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        for &pos in &members {
            topology.island_of.insert(pos, island_id);
        }
        topology.islands.push(members);
    }
    topology
}

#[cfg(test)]
mod tests {
    use super::*;
    use electra_core::{BusRecord, LineRecord, Transformer2WRecord};

    fn bus(tag: &str, active: bool) -> BusRecord {
        BusRecord {
            idtag: Some(tag.into()),
            active: Some(active),
            ..Default::default()
        }
    }

    fn line(tag: &str, from: &str, to: &str, active: bool) -> LineRecord {
        LineRecord {
            idtag: Some(tag.into()),
            bus_from: Some(from.into()),
            bus_to: Some(to.into()),
            active: Some(active),
            ..Default::default()
        }
    }

    #[test]
    fn test_open_line_splits_island() {
        let mut model = GridModel::default();
        let data = &mut model.model_data;
        data.bus = vec![bus("a", true), bus("b", true), bus("c", true)];
        data.line = vec![line("ab", "a", "b", true), line("bc", "b", "c", false)];

        let topo = find_islands(&model);
        assert_eq!(topo.islands.len(), 2);
        assert_eq!(topo.island_of(0), topo.island_of(1));
        assert_ne!(topo.island_of(0), topo.island_of(2));
    }

    #[test]
    fn test_inactive_bus_is_not_a_node() {
        let mut model = GridModel::default();
        let data = &mut model.model_data;
        data.bus = vec![bus("a", true), bus("b", false), bus("c", true)];
        data.line = vec![line("ab", "a", "b", true)];
        data.transformer2w = vec![Transformer2WRecord {
            idtag: Some("t".into()),
            bus_from: Some("b".into()),
            bus_to: Some("c".into()),
            ..Default::default()
        }];

        let topo = find_islands(&model);
        assert_eq!(topo.islands.len(), 2);
        assert_eq!(topo.island_of(1), None);
        assert!(topo.ends(Some("a"), Some("b")).is_none());
    }
}
