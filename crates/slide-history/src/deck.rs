/// Slide deck model tracked by the history engine.
///
/// The engine only needs to know how many elements a slide holds, so it
/// is generic over [`SlideContent`]. [`Slide`] is the concrete model used
/// by the CLI and by tests.
use serde::{Deserialize, Serialize};

/// What the history engine needs to know about a slide.
pub trait SlideContent {
    /// Number of elements placed on the slide.
    fn element_count(&self) -> usize;

    /// Whether the slide has no elements.
    fn is_blank(&self) -> bool {
        self.element_count() == 0
    }
}

/// Returns true when every slide in the deck is blank.
///
/// An empty deck counts as blank.
pub fn is_blank_deck<S: SlideContent>(slides: &[S]) -> bool {
    slides.iter().all(SlideContent::is_blank)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    #[default]
    Text,
    Image,
    Shape,
}

/// A positioned element on a slide.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideElement {
    pub id: String,
    pub kind: ElementKind,
    /// Text for text elements, source URL for images, shape name for shapes.
    pub content: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A single slide: an ordered list of elements plus an optional background.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Slide {
    pub id: String,
    pub elements: Vec<SlideElement>,
    /// CSS-style color or image reference.
    pub background: Option<String>,
}

impl Slide {
    /// Creates a slide with no elements.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Adds a text element and returns the slide.
    pub fn with_text(mut self, element_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.elements.push(SlideElement {
            id: element_id.into(),
            kind: ElementKind::Text,
            content: text.into(),
            ..SlideElement::default()
        });
        self
    }

    pub fn element(&self, element_id: &str) -> Option<&SlideElement> {
        self.elements.iter().find(|e| e.id == element_id)
    }

    pub fn element_mut(&mut self, element_id: &str) -> Option<&mut SlideElement> {
        self.elements.iter_mut().find(|e| e.id == element_id)
    }
}

impl SlideContent for Slide {
    fn element_count(&self) -> usize {
        self.elements.len()
    }
}
