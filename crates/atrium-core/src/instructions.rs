//! Turn-by-turn instruction generation.
//!
//! Converts a route's coordinate/floor sequence into ordered maneuver
//! entries. Bearing deltas bucket at 20, 45, and 135 degrees; consecutive
//! near-straight legs merge into one instruction with accumulated distance.

use serde::{Deserialize, Serialize};

use crate::geom::{self, Coord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstructionType {
    Start,
    Straight,
    SlightLeft,
    SlightRight,
    Left,
    Right,
    SharpLeft,
    SharpRight,
    FloorChange,
    Destination,
}

impl InstructionType {
    fn icon(self) -> &'static str {
        match self {
            InstructionType::Start => "start",
            InstructionType::Straight => "straight",
            InstructionType::SlightLeft => "slight-left",
            InstructionType::SlightRight => "slight-right",
            InstructionType::Left => "left",
            InstructionType::Right => "right",
            InstructionType::SharpLeft => "sharp-left",
            InstructionType::SharpRight => "sharp-right",
            InstructionType::FloorChange => "floor-change",
            InstructionType::Destination => "destination",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type")]
    pub instruction_type: InstructionType,
    pub text: String,
    pub distance_m: f64,
    pub icon: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor_id: Option<String>,
}

fn instruction(
    instruction_type: InstructionType,
    text: impl Into<String>,
    distance_m: f64,
    floor_id: Option<String>,
) -> Instruction {
    Instruction {
        instruction_type,
        text: text.into(),
        distance_m,
        icon: instruction_type.icon().to_string(),
        floor_id,
    }
}

/// Signed smallest difference between two bearings, in `(-180, 180]`.
fn bearing_delta(from_deg: f64, to_deg: f64) -> f64 {
    let mut delta = (to_deg - from_deg) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta <= -180.0 {
        delta += 360.0;
    }
    delta
}

fn classify_turn(delta_deg: f64) -> Option<InstructionType> {
    let magnitude = delta_deg.abs();
    if magnitude < 20.0 {
        return None; // straight enough to merge
    }
    let turn = if magnitude < 45.0 {
        if delta_deg > 0.0 {
            InstructionType::SlightRight
        } else {
            InstructionType::SlightLeft
        }
    } else if magnitude < 135.0 {
        if delta_deg > 0.0 {
            InstructionType::Right
        } else {
            InstructionType::Left
        }
    } else if delta_deg > 0.0 {
        InstructionType::SharpRight
    } else {
        InstructionType::SharpLeft
    };
    Some(turn)
}

fn turn_text(turn: InstructionType) -> &'static str {
    match turn {
        InstructionType::SlightLeft => "Bear left",
        InstructionType::SlightRight => "Bear right",
        InstructionType::Left => "Turn left",
        InstructionType::Right => "Turn right",
        InstructionType::SharpLeft => "Make a sharp left",
        InstructionType::SharpRight => "Make a sharp right",
        _ => "Continue straight",
    }
}

fn cardinal(bearing_deg: f64) -> &'static str {
    const NAMES: [&str; 8] = [
        "north",
        "northeast",
        "east",
        "southeast",
        "south",
        "southwest",
        "west",
        "northwest",
    ];
    let slot = ((bearing_deg + 22.5).rem_euclid(360.0) / 45.0) as usize % 8;
    NAMES[slot]
}

/// Generate instructions for a path with a matching floors sequence.
pub fn generate_instructions(path: &[Coord], floors: &[String]) -> Vec<Instruction> {
    if path.len() < 2 || path.len() != floors.len() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let initial_bearing = geom::bearing_deg(path[0], path[1]);
    out.push(instruction(
        InstructionType::Start,
        format!("Head {}", cardinal(initial_bearing)),
        0.0,
        Some(floors[0].clone()),
    ));

    let mut leg_distance = 0.0;
    for i in 1..path.len() {
        leg_distance += geom::distance_m(path[i - 1], path[i]);

        // Floor change between this point and the previous one.
        if floors[i] != floors[i - 1] {
            out.push(instruction(
                InstructionType::FloorChange,
                format!("Go to floor {}", floors[i]),
                leg_distance,
                Some(floors[i].clone()),
            ));
            leg_distance = 0.0;
            continue;
        }

        if i == path.len() - 1 {
            break;
        }
        // No turn at a floor boundary or across a degenerate leg.
        if floors[i + 1] != floors[i]
            || geom::distance_m(path[i - 1], path[i]) < 1e-3
            || geom::distance_m(path[i], path[i + 1]) < 1e-3
        {
            continue;
        }

        let incoming = geom::bearing_deg(path[i - 1], path[i]);
        let outgoing = geom::bearing_deg(path[i], path[i + 1]);
        if let Some(turn) = classify_turn(bearing_delta(incoming, outgoing)) {
            out.push(instruction(
                turn,
                turn_text(turn),
                leg_distance,
                Some(floors[i].clone()),
            ));
            leg_distance = 0.0;
        }
    }

    out.push(instruction(
        InstructionType::Destination,
        "You have arrived",
        leg_distance,
        floors.last().cloned(),
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::DEG_LAT_M;

    fn m(v: f64) -> f64 {
        v / DEG_LAT_M
    }

    fn on_floor(count: usize, floor: &str) -> Vec<String> {
        vec![floor.to_string(); count]
    }

    #[test]
    fn test_straight_corridor_is_start_and_destination() {
        let path = vec![[m(0.0), m(0.0)], [m(5.0), m(0.0)], [m(10.0), m(0.0)]];
        let instructions = generate_instructions(&path, &on_floor(3, "floor0"));
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].instruction_type, InstructionType::Start);
        assert_eq!(instructions[0].text, "Head east");
        assert_eq!(
            instructions[1].instruction_type,
            InstructionType::Destination
        );
        assert!((instructions[1].distance_m - 10.0).abs() < 0.1);
    }

    #[test]
    fn test_right_angle_turn() {
        let path = vec![[m(0.0), m(0.0)], [m(5.0), m(0.0)], [m(5.0), m(5.0)]];
        let instructions = generate_instructions(&path, &on_floor(3, "floor0"));
        assert_eq!(instructions.len(), 3);
        // East then north is a left turn.
        assert_eq!(instructions[1].instruction_type, InstructionType::Left);
        assert!((instructions[1].distance_m - 5.0).abs() < 0.1);
    }

    #[test]
    fn test_slight_and_sharp_classification() {
        assert_eq!(classify_turn(10.0), None);
        assert_eq!(classify_turn(30.0), Some(InstructionType::SlightRight));
        assert_eq!(classify_turn(-30.0), Some(InstructionType::SlightLeft));
        assert_eq!(classify_turn(90.0), Some(InstructionType::Right));
        assert_eq!(classify_turn(-90.0), Some(InstructionType::Left));
        assert_eq!(classify_turn(150.0), Some(InstructionType::SharpRight));
        assert_eq!(classify_turn(-150.0), Some(InstructionType::SharpLeft));
    }

    #[test]
    fn test_floor_change_instruction() {
        let path = vec![
            [m(0.0), m(0.0)],
            [m(5.0), m(0.0)],
            [m(5.0), m(0.0)],
            [m(10.0), m(0.0)],
        ];
        let floors = vec![
            "floor0".to_string(),
            "floor0".to_string(),
            "floor1".to_string(),
            "floor1".to_string(),
        ];
        let instructions = generate_instructions(&path, &floors);
        let change = instructions
            .iter()
            .find(|i| i.instruction_type == InstructionType::FloorChange)
            .unwrap();
        assert_eq!(change.text, "Go to floor floor1");
        assert_eq!(change.floor_id.as_deref(), Some("floor1"));
    }

    #[test]
    fn test_degenerate_input_yields_nothing() {
        assert!(generate_instructions(&[], &[]).is_empty());
        assert!(generate_instructions(&[[0.0, 0.0]], &on_floor(1, "floor0")).is_empty());
    }
}
