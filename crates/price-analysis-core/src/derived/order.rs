use std::collections::HashMap;

/// A rule seen by the sorter: the shape it writes and the shapes it reads.
pub(crate) struct Node<'a> {
    pub target: &'a str,
    pub deps: Vec<&'a str>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Orders nodes so every node comes after the nodes producing its dependencies.
///
/// Dependencies nobody in the set produces are external inputs and are ignored. Otherwise
/// declaration order is kept. On a cycle the offending node indices are returned.
pub(crate) fn dependency_order(nodes: &[Node<'_>]) -> Result<Vec<usize>, Vec<usize>> {
    let producers: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.target, index))
        .collect();

    let mut marks = vec![Mark::Unvisited; nodes.len()];
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(nodes.len());
    for index in 0..nodes.len() {
        visit(index, nodes, &producers, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}

fn visit(
    index: usize,
    nodes: &[Node<'_>],
    producers: &HashMap<&str, usize>,
    marks: &mut [Mark],
    stack: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), Vec<usize>> {
    match marks[index] {
        Mark::Done => return Ok(()),
        Mark::Visiting => {
            let start = stack.iter().position(|&n| n == index).unwrap_or(0);
            return Err(stack[start..].to_vec());
        }
        Mark::Unvisited => {}
    }

    marks[index] = Mark::Visiting;
    stack.push(index);
    for dep in &nodes[index].deps {
        if let Some(&producer) = producers.get(dep) {
            visit(producer, nodes, producers, marks, stack, order)?;
        }
    }
    stack.pop();
    marks[index] = Mark::Done;
    order.push(index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node<'a>(target: &'a str, deps: &[&'a str]) -> Node<'a> {
        Node {
            target,
            deps: deps.to_vec(),
        }
    }

    #[test]
    fn independent_nodes_keep_declaration_order() {
        let nodes = [node("a", &["x"]), node("b", &["y"]), node("c", &[])];
        assert_eq!(dependency_order(&nodes), Ok(vec![0, 1, 2]));
    }

    #[test]
    fn producers_move_ahead_of_consumers() {
        let nodes = [
            node("appraisal_price", &["rounded_final_value"]),
            node("rounded_final_value", &["final_value"]),
            node("final_value", &["total"]),
        ];
        assert_eq!(dependency_order(&nodes), Ok(vec![2, 1, 0]));
    }

    #[test]
    fn reports_cycle_members() {
        let nodes = [
            node("free", &[]),
            node("a", &["c"]),
            node("b", &["a"]),
            node("c", &["b"]),
        ];
        let cycle = dependency_order(&nodes).expect_err("cycle");
        assert_eq!(cycle, vec![1, 3, 2]);
    }
}
