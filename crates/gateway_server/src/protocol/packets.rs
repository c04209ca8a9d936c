//! Builders for the messages the gateway writes itself.

use super::{Frame, Opcode, PacketWriter, Source};
use gateway_events::{BattlegroundQueueInfo, BattlegroundStatus};

/// Reasons a character could not enter the world, in client wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoginFailureCode {
    LoginFailed = 0,
    WorldServerIsDown,
    CharAlreadyExists,
    NoInstanceServers,
    Disabled,
    CharNotFound,
    CharUpdateInProgress,
    CharLockedBilling,
    WarcraftRemote,
}

/// Response code of SMSG_CHAR_CREATE when creation failed.
pub const CHAR_CREATE_FAILED: u8 = 0x31;
/// Response code of SMSG_CHAR_DELETE when deletion failed.
pub const CHAR_DELETE_FAILED: u8 = 0x48;

/// Expansion level advertised in the auth response.
const EXPANSION_WOTLK: u8 = 2;
const AUTH_OK: u8 = 12;

pub const CHAT_MSG_SYSTEM: u8 = 0;
pub const CHAT_MSG_WHISPER: u8 = 7;
pub const CHAT_MSG_WHISPER_INFORM: u8 = 9;
const BATTLEFIELD_MAGIC: u16 = 0x1F90;

pub fn auth_challenge(seed: [u8; 4], random: &[u8; 32]) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_AUTH_CHALLENGE, 40);
    w.u32(1).bytes(&seed).bytes(random);
    w.finish(Source::Backend)
}

pub fn auth_response_ok() -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_AUTH_RESPONSE, 11);
    w.u8(AUTH_OK).u32(0).u8(0).u32(0).u8(EXPANSION_WOTLK);
    w.finish(Source::Backend)
}

pub fn tutorial_flags() -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_TUTORIAL_FLAGS, 32);
    for _ in 0..8 {
        w.u32(0xFFFF_FFFF);
    }
    w.finish(Source::Backend)
}

/// A system chat line shown in the client's chat frame.
pub fn system_message(text: &str) -> Frame {
    chat_message(CHAT_MSG_SYSTEM, 0, 0, text)
}

/// Whisper from `sender` as shown to its receiver.
pub fn whisper(sender: u64, language: u32, text: &str) -> Frame {
    chat_message(CHAT_MSG_WHISPER, language, sender, text)
}

/// Echo of a whisper the player sent to `receiver`.
pub fn whisper_inform(receiver: u64, language: u32, text: &str) -> Frame {
    chat_message(CHAT_MSG_WHISPER_INFORM, language, receiver, text)
}

pub fn chat_player_not_found(name: &str) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_CHAT_PLAYER_NOT_FOUND, name.len() + 1);
    w.cstring(name);
    w.finish(Source::Backend)
}

fn chat_message(kind: u8, language: u32, guid: u64, text: &str) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_MESSAGECHAT, 32 + text.len());
    w.u8(kind)
        .u32(language)
        .u64(guid)
        .u32(0)
        .u64(guid)
        .u32(text.len() as u32 + 1)
        .cstring(text)
        .u8(0); // chat tag
    w.finish(Source::Backend)
}

pub fn character_login_failed(code: LoginFailureCode) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_CHARACTER_LOGIN_FAILED, 1);
    w.u8(code as u8);
    w.finish(Source::Backend)
}

pub fn char_create_result(code: u8) -> Frame {
    let mut w = PacketWriter::new(Opcode::SMSG_CHAR_CREATE);
    w.u8(code);
    w.finish(Source::Backend)
}

pub fn char_delete_result(code: u8) -> Frame {
    let mut w = PacketWriter::new(Opcode::SMSG_CHAR_DELETE);
    w.u8(code);
    w.finish(Source::Backend)
}

pub fn new_world(map: u32, x: f32, y: f32, z: f32, orientation: f32) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_NEW_WORLD, 20);
    w.u32(map).f32(x).f32(y).f32(z).f32(orientation);
    w.finish(Source::Backend)
}

pub fn transfer_pending(map: u32) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_TRANSFER_PENDING, 4);
    w.u32(map);
    w.finish(Source::Backend)
}

pub fn realm_split(unk: u32) -> Frame {
    let split_date = "01/01/01";
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_REALM_SPLIT, 9 + split_date.len());
    w.u32(unk).u32(0).cstring(split_date);
    w.finish(Source::Backend)
}

/// SMSG_ACCOUNT_DATA_TIMES for the data types set in `mask`. `time_of` returns
/// the last save time of one account-data type.
pub fn account_data_times(now: u32, mask: u32, time_of: impl Fn(u32) -> u32) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_ACCOUNT_DATA_TIMES, 41);
    w.u32(now).u8(1).u32(mask);
    for data_type in 0..8u32 {
        if mask & (1 << data_type) != 0 {
            w.u32(time_of(data_type));
        }
    }
    w.finish(Source::Backend)
}

pub fn pong(sequence: u32) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_PONG, 4);
    w.u32(sequence);
    w.finish(Source::Backend)
}

pub fn group_joined_battleground(result: i32) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_GROUP_JOINED_BATTLEGROUND, 4);
    w.i32(result);
    w.finish(Source::Backend)
}

/// Clears a battlefield queue slot on the client.
pub fn battlefield_status_none(slot: u32) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_BATTLEFIELD_STATUS, 12);
    w.u32(slot).u64(0);
    w.finish(Source::Backend)
}

pub fn battlefield_status_in_queue(guid: u64, queue: &BattlegroundQueueInfo, average_wait_ms: u32) -> Frame {
    let mut w = battlefield_status_header(guid, queue, BattlegroundStatus::InQueue);
    w.u32(average_wait_ms).u32(0); // time in queue
    w.finish(Source::Backend)
}

pub fn battlefield_status_invited(
    guid: u64,
    queue: &BattlegroundQueueInfo,
    map_id: u32,
    time_to_accept_ms: u32,
) -> Frame {
    let mut w = battlefield_status_header(guid, queue, BattlegroundStatus::Invited);
    w.u32(map_id).u64(0).u32(time_to_accept_ms);
    w.finish(Source::Backend)
}

/// Status of a battleground queue the gateway only knows by type.
pub fn battlefield_status(slot: u32, type_id: u32, status: BattlegroundStatus) -> Frame {
    if status == BattlegroundStatus::None {
        return battlefield_status_none(slot);
    }
    let queue = BattlegroundQueueInfo {
        queue_slot_by_player: [(0, slot)].into(),
        arena_type: 0,
        type_id,
        min_level: 0,
        max_level: 0,
        is_rated: false,
    };
    let mut w = battlefield_status_header(0, &queue, status);
    w.u32(0).u32(0);
    w.finish(Source::Backend)
}

fn battlefield_status_header(
    guid: u64,
    queue: &BattlegroundQueueInfo,
    status: BattlegroundStatus,
) -> PacketWriter {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_BATTLEFIELD_STATUS, 40);
    w.u32(queue.slot_for(guid))
        .u8(queue.arena_type)
        .u8(if queue.arena_type == 0 { 0 } else { 0x0E })
        .u32(queue.type_id)
        .u16(BATTLEFIELD_MAGIC)
        .u8(queue.min_level)
        .u8(queue.max_level)
        .u32(0)
        .u8(queue.is_rated as u8)
        .u32(status as u32);
    w
}

/// Player login request sent to a world server.
pub fn player_login(guid: u64) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::CMSG_PLAYER_LOGIN, 8);
    w.u64(guid);
    w.finish(Source::Client)
}

/// Asks a world server to save the player and release it.
pub fn prepare_for_redirect() -> Frame {
    PacketWriter::new(Opcode::CMSG_PREPARE_FOR_REDIRECT).finish(Source::Client)
}

/// World server answer to [`prepare_for_redirect`]. A status of 0 means ready.
pub fn ready_for_redirect(status: u8) -> Frame {
    let mut w = PacketWriter::with_capacity(Opcode::SMSG_READY_FOR_REDIRECT, 1);
    w.u8(status);
    w.finish(Source::Backend)
}
