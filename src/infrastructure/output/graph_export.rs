//! Renders the constraint graph to DOT (Graphviz) or TikZ (LaTeX) for
//! diagnostic inspection. Neither export feeds back into scheduling.
//!
//! Grounded on the teacher's template-driven report generation: a `Tera`
//! instance with raw templates registered once at construction, rendered
//! against a `tera::Context` built per call, in place of hand-formatted
//! `write!`s.

use crate::domain::entities::graph::{Graph, VertexId, VertexKind};
use crate::error::{Result, SchedulerError};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tera::{Context, Tera};

const DOT_TEMPLATE: &str = r#"digraph constraints {
{% for n in nodes %}  n{{ n.id }} [label="{{ n.label }}"];
{% endfor %}
{% for e in edges %}  n{{ e.src }} -> n{{ e.dst }} [label="{{ e.weight }}"];
{% endfor %}}
"#;

const TIKZ_TEMPLATE: &str = r#"\begin{tikzpicture}[every node/.style={draw,circle,minimum size=6mm}]
{% for n in nodes %}\node (v{{ n.id }}) at ({{ n.x }}, {{ n.y }}) {{ "{" }}{{ n.label }}{{ "}" }};
{% endfor %}
{% for e in edges %}\draw[->] (v{{ e.src }}) -- node[midway,above,font=\tiny] {{ "{" }}{{ e.weight }}{{ "}" }} (v{{ e.dst }});
{% endfor %}\end{tikzpicture}
"#;

#[derive(Debug, Clone, Serialize)]
struct NodeView {
    id: u32,
    label: String,
    x: i64,
    y: i64,
}

#[derive(Debug, Clone, Serialize)]
struct EdgeView {
    src: u32,
    dst: u32,
    weight: i64,
}

pub struct GraphExporter {
    tera: Tera,
}

impl GraphExporter {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("graph.dot", DOT_TEMPLATE)
            .map_err(|e| SchedulerError::ParseError(e.to_string()))?;
        tera.add_raw_template("graph.tikz", TIKZ_TEMPLATE)
            .map_err(|e| SchedulerError::ParseError(e.to_string()))?;
        Ok(GraphExporter { tera })
    }

    fn label_of(graph: &Graph, id: VertexId) -> Result<String> {
        Ok(match graph.vertex(id)?.kind {
            VertexKind::Real(op) => format!("{op}"),
            VertexKind::Source(m) => format!("src M{m}"),
            VertexKind::Terminus => "terminus".to_string(),
            VertexKind::Maintenance(c) => format!("maint {c}"),
        })
    }

    fn context(&self, graph: &Graph) -> Result<Context> {
        let width = (graph.num_vertices() as f64).sqrt().ceil().max(1.0) as i64;

        let mut nodes = Vec::with_capacity(graph.num_vertices());
        for v in graph.vertices() {
            let idx = v.id.value() as i64;
            nodes.push(NodeView { id: v.id.value(), label: Self::label_of(graph, v.id)?, x: idx % width, y: idx / width });
        }

        let mut edges = Vec::new();
        for v in graph.vertices() {
            for (&dst, &weight) in v.outgoing_edges() {
                edges.push(EdgeView { src: v.id.value(), dst: dst.value(), weight });
            }
        }

        let mut ctx = Context::new();
        ctx.insert("nodes", &nodes);
        ctx.insert("edges", &edges);
        Ok(ctx)
    }

    pub fn render_dot(&self, graph: &Graph) -> Result<String> {
        let ctx = self.context(graph)?;
        self.tera.render("graph.dot", &ctx).map_err(|e| SchedulerError::ParseError(e.to_string()))
    }

    pub fn render_tikz(&self, graph: &Graph) -> Result<String> {
        let ctx = self.context(graph)?;
        self.tera.render("graph.tikz", &ctx).map_err(|e| SchedulerError::ParseError(e.to_string()))
    }

    pub fn write_dot<P: AsRef<Path>>(&self, graph: &Graph, path: P) -> Result<()> {
        let dot = self.render_dot(graph)?;
        fs::write(path.as_ref(), dot)
            .map_err(|e| SchedulerError::ParseError(format!("failed to write {}: {e}", path.as_ref().display())))
    }

    pub fn write_tikz<P: AsRef<Path>>(&self, graph: &Graph, path: P) -> Result<()> {
        let tikz = self.render_tikz(graph)?;
        fs::write(path.as_ref(), tikz)
            .map_err(|e| SchedulerError::ParseError(format!("failed to write {}: {e}", path.as_ref().display())))
    }
}

impl Default for GraphExporter {
    fn default() -> Self {
        Self::new().expect("built-in templates always parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ids::{JobId, MachineId, OperationId};
    use crate::domain::entities::operation::Operation;

    fn sample_graph() -> Graph {
        let mut g = Graph::new();
        let src = g.add_source(MachineId(0));
        let a = g.add_operation(Operation::new(JobId(0), OperationId(0)));
        let b = g.add_operation(Operation::new(JobId(1), OperationId(0)));
        g.add_or_update_edge(src, a, 0).unwrap();
        g.add_or_update_edge(a, b, 10).unwrap();
        g
    }

    #[test]
    fn dot_export_mentions_every_edge() {
        let exporter = GraphExporter::new().unwrap();
        let dot = exporter.render_dot(&sample_graph()).unwrap();
        assert!(dot.starts_with("digraph constraints"));
        assert!(dot.contains("-> n2"));
    }

    #[test]
    fn tikz_export_draws_every_node() {
        let exporter = GraphExporter::new().unwrap();
        let tikz = exporter.render_tikz(&sample_graph()).unwrap();
        assert!(tikz.contains("\\node (v0)"));
        assert!(tikz.contains("\\node (v2)"));
    }
}
