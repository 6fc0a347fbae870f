//! Adapter Board Diagnostics
//!
//! Informational dump of the boards the driver can see. No protocol impact;
//! an operator reads this from the log when bringing a rig up.

use can_protocol::{CanTransport, ErrorCode};
use tracing::{debug, info, warn};

/// Board slots the driver can address.
pub const MAX_BOARDS: u8 = 8;

/// Log name, manufacturer and channel numbers for every detected board.
/// Returns how many boards were found.
pub fn log_board_inventory<T: CanTransport>(transport: &mut T, max_boards: u8) -> usize {
    let mut found = 0;
    for slot in 0..max_boards {
        match transport.board_info(slot) {
            Ok(board) => {
                found += 1;
                info!(
                    "board {}: {} ({}), channels {:?}",
                    slot, board.name, board.manufacturer, board.channels
                );
            }
            // An empty slot, not a fault.
            Err(err) if matches!(err.code, ErrorCode::NoDevice | ErrorCode::InvalidParam) => {
                debug!("board slot {}: empty", slot);
            }
            Err(err) => warn!("board slot {} query failed: {}", slot, err),
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_protocol::{BoardInfo, MockTransport};

    #[test]
    fn test_counts_detected_boards() {
        let mut mock = MockTransport::new();
        mock.boards.push(BoardInfo {
            name: "CAN-bus-USB".into(),
            manufacturer: "Marathon Ltd".into(),
            channels: vec![0, 1],
        });
        assert_eq!(log_board_inventory(&mut mock, MAX_BOARDS), 1);
        assert_eq!(mock.calls.len(), MAX_BOARDS as usize);
    }

    #[test]
    fn test_no_boards() {
        let mut mock = MockTransport::new();
        assert_eq!(log_board_inventory(&mut mock, 4), 0);
    }
}
