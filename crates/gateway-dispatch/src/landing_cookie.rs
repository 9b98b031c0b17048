//! Landing identity cookie: 60 random hex characters followed by the
//! landing's numeric id in decimal. The Landing Asset Server recovers the
//! id by slicing everything past index 60.

use rand::RngCore;

const RANDOM_HEX_LEN: usize = 60;
pub const COOKIE_NAME: &str = "ti3948gh3d";

pub fn mint(landing_id: i64) -> String {
    let mut bytes = [0u8; RANDOM_HEX_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", hex::encode(bytes), landing_id)
}

/// Recovers the landing id from a cookie value, or `None` if the suffix
/// past the random prefix isn't a valid integer.
pub fn landing_id(cookie_value: &str) -> Option<i64> {
    cookie_value.get(RANDOM_HEX_LEN..)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_recover_round_trips() {
        let cookie = mint(4217);
        assert_eq!(cookie.len(), RANDOM_HEX_LEN + 4);
        assert_eq!(landing_id(&cookie), Some(4217));
    }

    #[test]
    fn short_value_yields_no_id() {
        assert_eq!(landing_id("tooshort"), None);
    }
}
