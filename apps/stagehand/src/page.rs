use kurbo::{Rect, Size};
use sandbox_agent::dom::{Document, NodeId};

pub const VIEWPORT: Size = Size::new(800.0, 800.0);

/// The editor's starter page, laid out as a browser would with
/// `body { margin: 0; padding: 20px }` and 100px `.box` squares.
pub fn sample_page() -> Document {
    let mut doc = Document::new(VIEWPORT);
    let body = doc.body();

    doc.append_element(body, "h1")
        .layout(Rect::new(20.0, 21.0, 780.0, 58.0))
        .text("GSAP Editor")
        .build();
    doc.append_element(body, "p")
        .layout(Rect::new(20.0, 79.0, 780.0, 97.0))
        .text("Click on any element below to select it!")
        .build();

    let colours = [None, Some("#10B981"), Some("#8B5CF6")];
    for (index, colour) in colours.into_iter().enumerate() {
        let top = 117.0 + index as f64 * 140.0;
        let mut builder = doc
            .append_element(body, "div")
            .class("box")
            .layout(Rect::new(40.0, top, 140.0, top + 100.0));
        if let Some(colour) = colour {
            builder = builder.style("background", colour);
        }
        let node = builder.build();
        // Page script: boxes grow on hover.
        doc.add_hover_style(node, "scale(1.1)");
    }

    doc.append_element(body, "button")
        .id("my-button")
        .style("padding", "12px 24px")
        .layout(Rect::new(40.0, 537.0, 145.0, 577.0))
        .text("Click Me!")
        .build();

    let section = doc
        .append_element(body, "div")
        .style("margin", "20px")
        .layout(Rect::new(40.0, 617.0, 760.0, 760.0))
        .build();
    doc.append_element(section, "h3")
        .layout(Rect::new(40.0, 636.0, 760.0, 659.0))
        .text("Sample Elements")
        .build();
    let list = doc
        .append_element(section, "ul")
        .layout(Rect::new(40.0, 678.0, 760.0, 738.0))
        .build();
    for n in 1..=3 {
        let top = 678.0 + (n - 1) as f64 * 20.0;
        doc.append_element(list, "li")
            .layout(Rect::new(80.0, top, 760.0, top + 20.0))
            .text(&format!("Item {n}"))
            .build();
    }
    doc
}

/// Connected elements under `body`, in document order.
pub fn body_elements(doc: &Document) -> Vec<NodeId> {
    let body = doc.body();
    doc.elements()
        .into_iter()
        .filter(|node| {
            let mut current = Some(*node);
            while let Some(id) = current {
                if id == body {
                    return true;
                }
                current = doc.parent_element(id);
            }
            false
        })
        .collect()
}
