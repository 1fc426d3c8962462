/// Wire protocol constants shared by the game and spectator protocols
pub mod protocol {
    /// Oldest client protocol accepted for spectating
    pub const CLIENT_VERSION_MIN: u16 = 1041;
    /// Newest client protocol accepted for spectating
    pub const CLIENT_VERSION_MAX: u16 = 1041;
    /// Human-readable form of the accepted version range
    pub const CLIENT_VERSION_STR: &str = "10.41";
    /// Size of the asymmetric key-exchange block in the first message
    pub const KEY_EXCHANGE_BLOCK_SIZE: usize = 128;
    /// Client build and type fields skipped after platform and version
    pub const HANDSHAKE_RESERVED_BYTES: usize = 5;
    /// Upper bound for a single framed message (either direction)
    pub const MAX_MESSAGE_SIZE: usize = 24590;
    /// Bytes one name list in a channel record may take, so the record
    /// stays well under `MAX_MESSAGE_SIZE`
    pub const NAME_LIST_BUDGET: usize = 8192;
    /// Frames queued for a connection before it is considered stuck
    pub const OUTBOUND_QUEUE_FRAMES: usize = 1024;
    /// Maximum number of things described on a single tile
    pub const MAX_TILE_THINGS: usize = 10;
    /// Client-side marker for "no highlight"
    pub const MARK_UNMARKED: u8 = 0xFF;
    /// Beat duration announced in the self-appear record (ms)
    pub const SERVER_BEAT: u16 = 0x32;
}

/// Client platform tags sent in the first message
pub mod client_os {
    pub const LINUX: u16 = 1;
    pub const WINDOWS: u16 = 2;
    pub const FLASH: u16 = 3;
    pub const OTCLIENT_LINUX: u16 = 10;
    pub const OTCLIENT_WINDOWS: u16 = 11;
    pub const OTCLIENT_MAC: u16 = 12;
}

/// Live cast constants
pub mod cast {
    /// Channel id of the spectator chat, shared with the caster session
    pub const CHANNEL_ID: u16 = 0xFFFE;
    /// Display name of the spectator chat
    pub const CHANNEL_NAME: &str = "Live Channel";
    /// Longest accepted spectator chat line
    pub const MAX_TEXT_LEN: usize = 255;
    /// Author shown for spectator chat lines
    pub const SPECTATOR_AUTHOR: &str = "Spectator";
    /// Stack position used when announcing creatures during sync
    pub const CREATURE_STACK_POS: u8 = 1;
    /// Known-creature capacity of an ordinary (caster) game session
    pub const CASTER_KNOWN_CREATURE_LIMIT: usize = 1300;
}

/// Disconnect reasons shown to spectators
pub mod messages {
    pub const VERSION_MISMATCH: &str = "Only clients with protocol 10.41 allowed!";
    pub const CAST_UNAVAILABLE: &str = "Live cast no longer exists. Please relogin to refresh the list.";
    pub const WRONG_PASSWORD: &str = "Wrong live cast password.";
    pub const SYNC_ERROR: &str = "A sync error has occured.";
    pub const CAST_ENDED: &str = "Live cast has ended.";
}

/// Creature id ranges used to guess a creature type from a bare id
pub mod creature_ids {
    /// Ids up to this value belong to players
    pub const PLAYER_MAX: u32 = 0x1000_0000;
    /// Ids up to this value (above the player range) belong to monsters
    pub const MONSTER_MAX: u32 = 0x4000_0000;
}

/// Speak classes
pub mod talk {
    /// Yellow channel text; the only class spectators may use
    pub const CHANNEL_YELLOW: u8 = 7;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_message_names_supported_version() {
        assert!(messages::VERSION_MISMATCH.contains(protocol::CLIENT_VERSION_STR));
        assert!(protocol::CLIENT_VERSION_MIN <= protocol::CLIENT_VERSION_MAX);
    }

    #[test]
    fn test_creature_id_ranges_ordered() {
        assert!(creature_ids::PLAYER_MAX < creature_ids::MONSTER_MAX);
    }
}
