//! LEA block cipher with a 256-bit key, used in ECB mode by version 0x0F BMD files.
//!
//! Words are little-endian. The key schedule produces 32 rounds of 6 subkeys
//! from an 8-word rolling state.

pub const BLOCK_SIZE: usize = 16;
pub const ROUNDS: usize = 32;

const DELTA: [u32; 8] = [
    0xc3efe9db, 0x44626b02, 0x79e27c8a, 0x78df30ec, 0x715ea49e, 0xc785da0a, 0xe04ef22a,
    0xe5c40957,
];

const SCHEDULE_ROTATIONS: [u32; 6] = [1, 3, 6, 11, 13, 17];

#[derive(Clone)]
pub struct Lea256 {
    round_keys: [[u32; 6]; ROUNDS],
}

impl Lea256 {
    pub fn new(key: &[u8; 32]) -> Self {
        let mut t = [0u32; 8];
        for (i, word) in t.iter_mut().enumerate() {
            *word = read_u32(key, i * 4);
        }

        let mut round_keys = [[0u32; 6]; ROUNDS];
        for (i, rk) in round_keys.iter_mut().enumerate() {
            let delta = DELTA[i & 7];
            let base = (i * 6) & 7;
            for (j, rotation) in SCHEDULE_ROTATIONS.iter().enumerate() {
                let slot = (base + j) & 7;
                let shifted = delta.rotate_left(((i + j) % 32) as u32);
                t[slot] = t[slot].wrapping_add(shifted).rotate_left(*rotation);
                rk[j] = t[slot];
            }
        }

        Self { round_keys }
    }

    pub fn round_keys(&self) -> &[[u32; 6]; ROUNDS] {
        &self.round_keys
    }

    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let mut s = load_block(block);
        for rk in self.round_keys.iter() {
            let n0 = ((s[0] ^ rk[0]).wrapping_add(s[1] ^ rk[1])).rotate_left(9);
            let n1 = ((s[1] ^ rk[2]).wrapping_add(s[2] ^ rk[3])).rotate_right(5);
            let n2 = ((s[2] ^ rk[4]).wrapping_add(s[3] ^ rk[5])).rotate_right(3);
            s = [n0, n1, n2, s[0]];
        }
        store_block(&s, block);
    }

    pub fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let mut s = load_block(block);
        for rk in self.round_keys.iter().rev() {
            let t0 = s[3];
            let t1 = s[0].rotate_right(9).wrapping_sub(t0 ^ rk[0]) ^ rk[1];
            let t2 = s[1].rotate_left(5).wrapping_sub(t1 ^ rk[2]) ^ rk[3];
            let t3 = s[2].rotate_left(3).wrapping_sub(t2 ^ rk[4]) ^ rk[5];
            s = [t0, t1, t2, t3];
        }
        store_block(&s, block);
    }

    /// Decrypt whole blocks in place. A trailing partial block is left untouched.
    pub fn decrypt_ecb(&self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            self.decrypt_block(&mut block);
            chunk.copy_from_slice(&block);
        }
    }

    pub fn encrypt_ecb(&self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            self.encrypt_block(&mut block);
            chunk.copy_from_slice(&block);
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn load_block(block: &[u8; BLOCK_SIZE]) -> [u32; 4] {
    [
        read_u32(block, 0),
        read_u32(block, 4),
        read_u32(block, 8),
        read_u32(block, 12),
    ]
}

fn store_block(s: &[u32; 4], block: &mut [u8; BLOCK_SIZE]) {
    for (i, word) in s.iter().enumerate() {
        block[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmd::decrypt::LEA_KEY;

    #[test]
    fn test_key_schedule_first_round() {
        let cipher = Lea256::new(&LEA_KEY);
        let rk = cipher.round_keys();
        assert_eq!(rk[0][0], 0xae6a754f);
        assert_eq!(rk[0][1], 0xb1bbd3ce);
    }

    #[test]
    fn test_kat_lea256() {
        let key: [u8; 32] = [
            0x0f, 0x1e, 0x2d, 0x3c, 0x4b, 0x5a, 0x69, 0x78, 0x87, 0x96, 0xa5, 0xb4, 0xc3, 0xd2,
            0xe1, 0xf0, 0xf0, 0xe1, 0xd2, 0xc3, 0xb4, 0xa5, 0x96, 0x87, 0x78, 0x69, 0x5a, 0x4b,
            0x3c, 0x2d, 0x1e, 0x0f,
        ];
        let plaintext: [u8; 16] = *b"0123456789:;<=>?";
        let ciphertext: [u8; 16] = [
            0xd6, 0x51, 0xaf, 0xf6, 0x47, 0xb1, 0x89, 0xc1, 0x3a, 0x89, 0x00, 0xca, 0x27, 0xf9,
            0xe1, 0x97,
        ];

        let cipher = Lea256::new(&key);
        let mut block = plaintext;
        cipher.encrypt_block(&mut block);
        assert_eq!(block, ciphertext);
        cipher.decrypt_block(&mut block);
        assert_eq!(block, plaintext);
    }

    #[test]
    fn test_block_round_trip() {
        let cipher = Lea256::new(&LEA_KEY);
        let original: [u8; 16] = *b"BMD\x0aplaintext!!!";
        let mut block = original;
        cipher.encrypt_block(&mut block);
        assert_ne!(block, original);
        cipher.decrypt_block(&mut block);
        assert_eq!(block, original);
    }

    #[test]
    fn test_round_trip_arbitrary_keys() {
        for seed in 0u8..8 {
            let mut key = [0u8; 32];
            for (i, b) in key.iter_mut().enumerate() {
                *b = seed.wrapping_mul(31).wrapping_add(i as u8 * 7);
            }
            let cipher = Lea256::new(&key);
            let mut block = [0u8; 16];
            for (i, b) in block.iter_mut().enumerate() {
                *b = seed ^ (i as u8).wrapping_mul(13);
            }
            let original = block;
            cipher.encrypt_block(&mut block);
            cipher.decrypt_block(&mut block);
            assert_eq!(block, original, "seed {}", seed);
        }
    }

    #[test]
    fn test_ecb_blocks_independent() {
        let cipher = Lea256::new(&LEA_KEY);
        let mut data = [0x41u8; 32];
        cipher.encrypt_ecb(&mut data);
        // identical plaintext blocks encrypt identically in ECB
        assert_eq!(data[..16], data[16..]);
        cipher.decrypt_ecb(&mut data);
        assert_eq!(data, [0x41u8; 32]);
    }
}
