//! Static room catalog. Floors and their rooms are configuration, not data:
//! bookings can only target a room listed here.

use serde::Serialize;

use crate::model::Floor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: &'static str,
    pub title: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FloorCatalog {
    pub floor: Floor,
    pub label: &'static str,
    pub rooms: &'static [Room],
}

pub static FLOORS: &[FloorCatalog] = &[
    FloorCatalog {
        floor: Floor(10),
        label: "10th Floor",
        rooms: &[
            Room { id: "Room1", title: "Room 1 (Big Room)" },
            Room { id: "Room2", title: "Room 2 (Mid Room)" },
            Room { id: "Room3", title: "Room 3 (Small Room, no TV)" },
        ],
    },
    FloorCatalog {
        floor: Floor(7),
        label: "7th Floor",
        rooms: &[
            Room { id: "Room1", title: "Meeting Room" },
            Room { id: "Room2", title: "Training Room" },
        ],
    },
];

pub fn floor(floor: Floor) -> Option<&'static FloorCatalog> {
    FLOORS.iter().find(|f| f.floor == floor)
}

pub fn floors() -> impl Iterator<Item = Floor> {
    FLOORS.iter().map(|f| f.floor)
}

pub fn room(floor: Floor, room: &str) -> Option<&'static Room> {
    self::floor(floor)?.rooms.iter().find(|r| r.id == room)
}

pub fn has_room(floor: Floor, room: &str) -> bool {
    self::room(floor, room).is_some()
}

/// Human label for emails, e.g. "10th Floor". Unknown floors fall back to
/// "Floor N".
pub fn floor_label(floor: Floor) -> String {
    self::floor(floor)
        .map(|f| f.label.to_string())
        .unwrap_or_else(|| format!("Floor {floor}"))
}
