//! Game protocol opcodes known to the gateway.
//!
//! Opcodes travel as 2 bytes toward the client and 4 bytes toward backends, so
//! they are held as `u32` and narrowed only when encoded.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u32);

impl Opcode {
    pub const CMSG_CHAR_CREATE: Opcode = Opcode(0x036);
    pub const CMSG_CHAR_ENUM: Opcode = Opcode(0x037);
    pub const CMSG_CHAR_DELETE: Opcode = Opcode(0x038);
    pub const SMSG_CHAR_CREATE: Opcode = Opcode(0x03A);
    pub const SMSG_CHAR_ENUM: Opcode = Opcode(0x03B);
    pub const SMSG_CHAR_DELETE: Opcode = Opcode(0x03C);
    pub const CMSG_PLAYER_LOGIN: Opcode = Opcode(0x03D);
    pub const SMSG_NEW_WORLD: Opcode = Opcode(0x03E);
    pub const SMSG_TRANSFER_PENDING: Opcode = Opcode(0x03F);
    pub const SMSG_CHARACTER_LOGIN_FAILED: Opcode = Opcode(0x041);
    pub const CMSG_LOGOUT_REQUEST: Opcode = Opcode(0x04B);
    pub const SMSG_GROUP_LIST: Opcode = Opcode(0x07D);
    pub const CMSG_MESSAGECHAT: Opcode = Opcode(0x095);
    pub const SMSG_MESSAGECHAT: Opcode = Opcode(0x096);
    pub const MSG_MOVE_WORLDPORT_ACK: Opcode = Opcode(0x0DC);
    pub const SMSG_TUTORIAL_FLAGS: Opcode = Opcode(0x0FD);
    pub const SMSG_LEVELUP_INFO: Opcode = Opcode(0x1D4);
    pub const CMSG_PING: Opcode = Opcode(0x1DC);
    pub const SMSG_PONG: Opcode = Opcode(0x1DD);
    pub const SMSG_AUTH_CHALLENGE: Opcode = Opcode(0x1EC);
    pub const CMSG_AUTH_SESSION: Opcode = Opcode(0x1ED);
    pub const SMSG_AUTH_RESPONSE: Opcode = Opcode(0x1EE);
    pub const SMSG_ACCOUNT_DATA_TIMES: Opcode = Opcode(0x209);
    pub const SMSG_INIT_WORLD_STATES: Opcode = Opcode(0x2C2);
    pub const SMSG_BATTLEFIELD_STATUS: Opcode = Opcode(0x2D4);
    pub const CMSG_BATTLEFIELD_PORT: Opcode = Opcode(0x2D5);
    pub const SMSG_CHAT_PLAYER_NOT_FOUND: Opcode = Opcode(0x2A9);
    pub const SMSG_GROUP_JOINED_BATTLEGROUND: Opcode = Opcode(0x2E8);
    pub const CMSG_BATTLEMASTER_JOIN: Opcode = Opcode(0x2EE);
    pub const SMSG_ADDON_INFO: Opcode = Opcode(0x2EF);
    pub const SMSG_MOTD: Opcode = Opcode(0x33D);
    pub const SMSG_REALM_SPLIT: Opcode = Opcode(0x38B);
    pub const CMSG_REALM_SPLIT: Opcode = Opcode(0x38C);
    pub const CMSG_READY_FOR_ACCOUNT_DATA_TIMES: Opcode = Opcode(0x4FF);

    // Gateway <-> backend control frames, above the client opcode range.
    pub const CMSG_PREPARE_FOR_REDIRECT: Opcode = Opcode(0x520);
    pub const SMSG_READY_FOR_REDIRECT: Opcode = Opcode(0x521);

    pub fn name(&self) -> &'static str {
        match *self {
            Opcode::CMSG_CHAR_CREATE => "CMSG_CHAR_CREATE",
            Opcode::CMSG_CHAR_ENUM => "CMSG_CHAR_ENUM",
            Opcode::CMSG_CHAR_DELETE => "CMSG_CHAR_DELETE",
            Opcode::SMSG_CHAR_CREATE => "SMSG_CHAR_CREATE",
            Opcode::SMSG_CHAR_ENUM => "SMSG_CHAR_ENUM",
            Opcode::SMSG_CHAR_DELETE => "SMSG_CHAR_DELETE",
            Opcode::CMSG_PLAYER_LOGIN => "CMSG_PLAYER_LOGIN",
            Opcode::SMSG_NEW_WORLD => "SMSG_NEW_WORLD",
            Opcode::SMSG_TRANSFER_PENDING => "SMSG_TRANSFER_PENDING",
            Opcode::SMSG_CHARACTER_LOGIN_FAILED => "SMSG_CHARACTER_LOGIN_FAILED",
            Opcode::CMSG_LOGOUT_REQUEST => "CMSG_LOGOUT_REQUEST",
            Opcode::SMSG_GROUP_LIST => "SMSG_GROUP_LIST",
            Opcode::CMSG_MESSAGECHAT => "CMSG_MESSAGECHAT",
            Opcode::SMSG_MESSAGECHAT => "SMSG_MESSAGECHAT",
            Opcode::MSG_MOVE_WORLDPORT_ACK => "MSG_MOVE_WORLDPORT_ACK",
            Opcode::SMSG_TUTORIAL_FLAGS => "SMSG_TUTORIAL_FLAGS",
            Opcode::SMSG_LEVELUP_INFO => "SMSG_LEVELUP_INFO",
            Opcode::CMSG_PING => "CMSG_PING",
            Opcode::SMSG_PONG => "SMSG_PONG",
            Opcode::SMSG_AUTH_CHALLENGE => "SMSG_AUTH_CHALLENGE",
            Opcode::CMSG_AUTH_SESSION => "CMSG_AUTH_SESSION",
            Opcode::SMSG_AUTH_RESPONSE => "SMSG_AUTH_RESPONSE",
            Opcode::SMSG_ACCOUNT_DATA_TIMES => "SMSG_ACCOUNT_DATA_TIMES",
            Opcode::SMSG_INIT_WORLD_STATES => "SMSG_INIT_WORLD_STATES",
            Opcode::SMSG_BATTLEFIELD_STATUS => "SMSG_BATTLEFIELD_STATUS",
            Opcode::CMSG_BATTLEFIELD_PORT => "CMSG_BATTLEFIELD_PORT",
            Opcode::SMSG_CHAT_PLAYER_NOT_FOUND => "SMSG_CHAT_PLAYER_NOT_FOUND",
            Opcode::SMSG_GROUP_JOINED_BATTLEGROUND => "SMSG_GROUP_JOINED_BATTLEGROUND",
            Opcode::CMSG_BATTLEMASTER_JOIN => "CMSG_BATTLEMASTER_JOIN",
            Opcode::SMSG_ADDON_INFO => "SMSG_ADDON_INFO",
            Opcode::SMSG_MOTD => "SMSG_MOTD",
            Opcode::SMSG_REALM_SPLIT => "SMSG_REALM_SPLIT",
            Opcode::CMSG_REALM_SPLIT => "CMSG_REALM_SPLIT",
            Opcode::CMSG_READY_FOR_ACCOUNT_DATA_TIMES => "CMSG_READY_FOR_ACCOUNT_DATA_TIMES",
            Opcode::CMSG_PREPARE_FOR_REDIRECT => "CMSG_PREPARE_FOR_REDIRECT",
            Opcode::SMSG_READY_FOR_REDIRECT => "SMSG_READY_FOR_REDIRECT",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:X})", self.name(), self.0)
    }
}

impl From<u32> for Opcode {
    fn from(value: u32) -> Self {
        Opcode(value)
    }
}
