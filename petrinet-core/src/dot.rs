//! Graphviz DOT export.

use crate::definition::{PetriNet, PlaceId};
use crate::marking::Marking;
use dot_writer::{Attributes, DotWriter, Shape, Style};

/// Renders `net` as a DOT digraph under `marking` (default: the initial
/// marking).
///
/// Places become circles labelled with their name and token count,
/// transitions become filled boxes, and every arc occurrence becomes one
/// edge (input place to transition, transition to output place).
pub fn to_dot(net: &PetriNet, marking: Option<&Marking>) -> String {
    let marking = marking.unwrap_or_else(|| net.initial_marking());

    let mut buffer = Vec::new();
    {
        let mut writer = DotWriter::from(&mut buffer);
        let mut digraph = writer.digraph();
        digraph.set("rankdir", "LR", false);

        for (index, name) in net.places().iter().enumerate() {
            let tokens = marking.tokens(PlaceId::new(index));
            let mut node = digraph.node_named(quoted(name));
            node.set_shape(Shape::Circle);
            node.set_label(&format!("{}\\n{}", escape(name), tokens));
        }

        for transition in net.transitions() {
            let mut node = digraph.node_named(quoted(transition.name()));
            node.set_shape(Shape::Rectangle);
            node.set_style(Style::Filled);
            node.set("fillcolor", "lightgrey", false);
        }

        for transition in net.transitions() {
            let t_id = quoted(transition.name());
            for &input in transition.inputs() {
                if let Some(place) = net.place_name(input) {
                    digraph.edge(quoted(place), &t_id);
                }
            }
            for &output in transition.outputs() {
                if let Some(place) = net.place_name(output) {
                    digraph.edge(&t_id, quoted(place));
                }
            }
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

fn quoted(name: &str) -> String {
    format!("\"{}\"", escape(name))
}
