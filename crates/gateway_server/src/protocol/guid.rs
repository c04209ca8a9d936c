//! Player guid layout.
//!
//! A player guid keeps its per-realm counter in the low 32 bits. Characters
//! playing on a server shared by several realms get the realm id in bits
//! 32..48 so their guids can't collide.

const REALM_SHIFT: u32 = 32;
const HIGH_SHIFT: u32 = 48;
const HIGH_PLAYER: u64 = 0x0000;

/// Realm-local counter of a player guid.
pub fn low_guid(guid: u64) -> u32 {
    guid as u32
}

/// Guid of player `guid` from `realm_id` on a cross-realm world server.
pub fn crossrealm_player_guid(realm_id: u32, guid: u64) -> u64 {
    let counter = u64::from(low_guid(guid));
    if counter == 0 {
        return 0;
    }
    counter | (u64::from(realm_id as u16) << REALM_SHIFT) | (HIGH_PLAYER << HIGH_SHIFT)
}
