// ============================================================================
// EDIT MODES - which gestures the editor honours right now
// ============================================================================

use std::fmt;

/// The active editing mode.  Exactly one is active at a time; any mode can
/// be switched to from any other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EditMode {
    /// Select, drag and restyle text layers.
    #[default]
    Text,
    /// Brush a region for a masked edit.
    Retouch,
    /// Drag out and apply a crop rectangle.
    Crop,
}

impl EditMode {
    pub const ALL: [EditMode; 3] = [EditMode::Text, EditMode::Retouch, EditMode::Crop];

    pub fn label(&self) -> &'static str {
        match self {
            EditMode::Text => "Text",
            EditMode::Retouch => "Retouch",
            EditMode::Crop => "Crop",
        }
    }

    /// Whether `gesture` may act on the document in this mode.  Nothing is
    /// honoured while a request is in flight.
    pub fn permits(&self, gesture: Gesture, busy: bool) -> bool {
        if busy {
            return false;
        }
        gesture.mode() == *self
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A user interaction with the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Gesture {
    SelectLayer,
    MoveLayer,
    EditLayer,
    BrushStroke,
    CropDrag,
    CropComplete,
}

impl Gesture {
    /// The one mode in which this gesture is live.
    pub fn mode(&self) -> EditMode {
        match self {
            Gesture::SelectLayer | Gesture::MoveLayer | Gesture::EditLayer => EditMode::Text,
            Gesture::BrushStroke => EditMode::Retouch,
            Gesture::CropDrag | Gesture::CropComplete => EditMode::Crop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GESTURES: [Gesture; 6] = [
        Gesture::SelectLayer,
        Gesture::MoveLayer,
        Gesture::EditLayer,
        Gesture::BrushStroke,
        Gesture::CropDrag,
        Gesture::CropComplete,
    ];

    #[test]
    fn starts_in_text_mode() {
        assert_eq!(EditMode::default(), EditMode::Text);
    }

    #[test]
    fn each_gesture_belongs_to_exactly_one_mode() {
        for gesture in GESTURES {
            let live: Vec<_> = EditMode::ALL
                .iter()
                .filter(|m| m.permits(gesture, false))
                .collect();
            assert_eq!(live.len(), 1, "{:?}", gesture);
        }
    }

    #[test]
    fn layer_dragging_only_in_text_mode() {
        assert!(EditMode::Text.permits(Gesture::MoveLayer, false));
        assert!(!EditMode::Retouch.permits(Gesture::MoveLayer, false));
        assert!(!EditMode::Crop.permits(Gesture::SelectLayer, false));
        assert!(EditMode::Retouch.permits(Gesture::BrushStroke, false));
        assert!(EditMode::Crop.permits(Gesture::CropComplete, false));
    }

    #[test]
    fn busy_blocks_everything() {
        for mode in EditMode::ALL {
            for gesture in GESTURES {
                assert!(!mode.permits(gesture, true));
            }
        }
    }
}
