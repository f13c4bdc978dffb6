//! Foreign-key dependency ordering.
//!
//! Tables are created so that every foreign-key target exists before the table
//! referencing it. Among tables whose targets all exist, declaration order
//! wins, with pivot tables after the models. Self references do not count as
//! dependencies.

use crate::schema::{ModelDefinition, PivotTable, Schema, SchemaError};

/// A table the compiler emits: a model table or a pivot table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TableNode<'s> {
    Model(&'s ModelDefinition),
    Pivot(&'s PivotTable),
}

impl<'s> TableNode<'s> {
    pub fn name(&self) -> &'s str {
        match self {
            TableNode::Model(model) => &model.table,
            TableNode::Pivot(pivot) => &pivot.name,
        }
    }

    fn dependencies(&self) -> Vec<String> {
        match self {
            TableNode::Model(model) => model.dependencies(),
            TableNode::Pivot(pivot) => {
                let mut deps: Vec<String> = pivot.keys.iter().map(|k| k.table.clone()).collect();
                deps.dedup();
                deps
            }
        }
    }
}

/// All tables of a schema in creation order.
///
/// # Errors
///
/// Returns `SchemaError::CyclicDependency` naming the tables of one cycle when
/// no valid order exists.
pub fn creation_order(schema: &Schema) -> Result<Vec<TableNode<'_>>, SchemaError> {
    let nodes: Vec<TableNode<'_>> = schema
        .models()
        .iter()
        .map(TableNode::Model)
        .chain(schema.pivot_tables().iter().map(TableNode::Pivot))
        .collect();
    let deps: Vec<Vec<String>> = nodes.iter().map(TableNode::dependencies).collect();

    let mut emitted = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    while order.len() < nodes.len() {
        let ready = (0..nodes.len()).find(|&i| {
            !emitted[i]
                && deps[i].iter().all(|dep| {
                    nodes
                        .iter()
                        .zip(&emitted)
                        .any(|(node, done)| *done && node.name() == dep)
                })
        });
        match ready {
            Some(i) => {
                emitted[i] = true;
                order.push(nodes[i]);
            }
            None => return Err(SchemaError::CyclicDependency(find_cycle(&nodes, &deps, &emitted))),
        }
    }
    Ok(order)
}

/// Walk unresolved dependencies from the first blocked table until a table repeats.
fn find_cycle(nodes: &[TableNode<'_>], deps: &[Vec<String>], emitted: &[bool]) -> Vec<String> {
    let index_of = |name: &str| nodes.iter().position(|n| n.name() == name);
    let Some(mut current) = emitted.iter().position(|done| !done) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    loop {
        if let Some(start) = path.iter().position(|&i| i == current) {
            let mut cycle: Vec<String> = path[start..].iter().map(|&i| nodes[i].name().to_string()).collect();
            cycle.push(nodes[current].name().to_string());
            return cycle;
        }
        path.push(current);
        let next = deps[current]
            .iter()
            .filter_map(|dep| index_of(dep))
            .find(|&i| !emitted[i]);
        match next {
            Some(i) => current = i,
            None => return path.iter().map(|&i| nodes[i].name().to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelBuilder;

    fn names(schema: &Schema) -> Vec<String> {
        creation_order(schema)
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect()
    }

    #[test]
    fn targets_come_before_referencing_tables() {
        let schema = Schema::builder()
            .model(ModelBuilder::new("Comment").id().belongs_to("Post").belongs_to("User"))
            .model(ModelBuilder::new("Post").id().belongs_to("User").belongs_to_many("Tag"))
            .model(ModelBuilder::new("Tag").id())
            .model(ModelBuilder::new("User").id().has_many("Post"))
            .build()
            .unwrap();

        assert_eq!(names(&schema), vec!["tag", "user", "post", "comment", "post_tag"]);
    }

    #[test]
    fn self_reference_is_not_a_cycle() {
        let schema = Schema::builder()
            .model(
                ModelBuilder::new("Category")
                    .id()
                    .belongs_to_keyed("Category", "parent_id", "id")
                    .nullable(true)
                    .named("parent"),
            )
            .build()
            .unwrap();
        assert_eq!(names(&schema), vec!["category"]);
    }

    #[test]
    fn cycles_are_reported() {
        let schema = Schema::builder()
            .model(ModelBuilder::new("A").id().belongs_to("B"))
            .model(ModelBuilder::new("B").id().belongs_to("C"))
            .model(ModelBuilder::new("C").id().belongs_to("A"))
            .build()
            .unwrap();

        let err = creation_order(&schema).unwrap_err();
        assert_eq!(
            err,
            SchemaError::CyclicDependency(vec!["a".into(), "b".into(), "c".into(), "a".into()])
        );
        assert_eq!(err.to_string(), "Circular dependency detected among tables: a -> b -> c -> a");
    }
}
