//! Image generation.
//!
//! Builds synthetic application images that look enough like a Cortex-M
//! binary for the updater: a vector table with a stack pointer and a thumb
//! reset handler inside the image, followed by a body.  The body is either
//! built from a small pool of repeated snippets, so it compresses the way code
//! does, or is pure noise, so that it cannot be compressed at all.

use std::{fs, path::Path};

use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

use anyhow::{anyhow, Result};

/// Size of the reference image the updater was sized for.
pub const DEFAULT_SIZE: usize = 45_728;

/// Number of words in the Cortex-M core vector table.
const VECTOR_WORDS: usize = 16;

/// Offset of the generated reset handler from the start of the image.
const RESET_OFFSET: usize = 0x100;

/// Offset of the handler every other vector points at.
const DEFAULT_HANDLER_OFFSET: usize = 0x140;

pub struct GeneratedImage {
    pub data: Vec<u8>,
    /// Address the image is linked to run at.
    pub base: usize,
}

impl GeneratedImage {
    /// Read a raw application binary from disk, such as one produced by
    /// `objcopy -O binary`.
    pub fn from_file<P: AsRef<Path>>(path: P, base: usize) -> Result<GeneratedImage> {
        let data = fs::read(path.as_ref())
            .map_err(|e| anyhow!("Unable to read {}: {}", path.as_ref().display(), e))?;
        if data.len() < 2 * 4 {
            return Err(anyhow!("Image {} has no vector table", path.as_ref().display()));
        }
        Ok(GeneratedImage { data, base })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, &self.data)?;
        Ok(())
    }

    /// The initial stack pointer, the first word of the vector table.
    pub fn stack_pointer(&self) -> u32 {
        self.word(0)
    }

    /// The reset handler, the second word of the vector table.
    pub fn entry(&self) -> u32 {
        self.word(1)
    }

    fn word(&self, index: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.data[index * 4..index * 4 + 4]);
        u32::from_le_bytes(word)
    }
}

pub struct GenBuilder {
    /// Total size of the image.
    size: usize,
    /// Seed for the PRNG
    seed: usize,
    /// Link address of the image.
    base: usize,
    /// Initial stack pointer.
    stack_top: u32,
    /// Make the body incompressible.
    noise: bool,
}

impl Default for GenBuilder {
    fn default() -> Self {
        GenBuilder {
            size: DEFAULT_SIZE,
            seed: 1,
            base: 0x2_0000,
            stack_top: 0x2004_0000,
            noise: false,
        }
    }
}

impl GenBuilder {
    pub fn size(&mut self, size: usize) -> &mut Self {
        self.size = size;
        self
    }

    pub fn seed(&mut self, seed: usize) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn base(&mut self, base: usize) -> &mut Self {
        self.base = base;
        self
    }

    /// Fill the body with random bytes.
    pub fn noise(&mut self) -> &mut Self {
        self.noise = true;
        self
    }

    pub fn build(&self) -> Result<GeneratedImage> {
        if self.size < DEFAULT_HANDLER_OFFSET + 4 {
            return Err(anyhow!("Image size {} is too small for a vector table", self.size));
        }
        let base = u32::try_from(self.base)
            .map_err(|_| anyhow!("Base 0x{:x} is outside the 32-bit address space", self.base))?;

        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed as u64);
        let mut data = vec![0u8; self.size];

        if self.noise {
            rng.fill_bytes(&mut data);
        } else {
            fill_code(&mut rng, &mut data);
        }

        // Vector table.  Handlers have the thumb bit set.
        let reset = (base + RESET_OFFSET as u32) | 1;
        data[0..4].copy_from_slice(&self.stack_top.to_le_bytes());
        data[4..8].copy_from_slice(&reset.to_le_bytes());

        // The repeated handler words would give the compressor something to
        // match, so noise images only get the reset vector.
        if !self.noise {
            let default_handler = (base + DEFAULT_HANDLER_OFFSET as u32) | 1;
            for index in 2..VECTOR_WORDS {
                data[index * 4..index * 4 + 4].copy_from_slice(&default_handler.to_le_bytes());
            }
        }

        Ok(GeneratedImage { data, base: self.base })
    }
}

/// Fill with something that compresses like a firmware image: runs picked
/// from a pool of snippets, the odd literal, and a zeroed tail.
fn fill_code(rng: &mut Xoshiro256Plus, data: &mut [u8]) {
    let pool: Vec<Vec<u8>> = (0..48)
        .map(|_| {
            let mut snippet = vec![0u8; rng.gen_range(2..=24)];
            rng.fill_bytes(&mut snippet);
            snippet
        })
        .collect();

    let body_end = data.len() - data.len() / 16;
    let mut pos = 0;
    while pos < body_end {
        let chunk = if rng.gen_range(0..16) == 0 {
            let mut literal = [0u8; 8];
            let len = rng.gen_range(1..=literal.len());
            rng.fill_bytes(&mut literal[..len]);
            literal[..len].to_vec()
        } else {
            pool[rng.gen_range(0..pool.len())].clone()
        };
        let len = chunk.len().min(body_end - pos);
        data[pos..pos + len].copy_from_slice(&chunk[..len]);
        pos += len;
    }
    data[body_end..].fill(0);
}

#[cfg(test)]
mod tester {
    use temp_dir::TempDir;

    use super::GenBuilder;
    use super::GeneratedImage;
    use super::VECTOR_WORDS;

    #[test]
    fn test_gen() {
        let img = GenBuilder::default().build().unwrap();
        assert_eq!(img.data.len(), super::DEFAULT_SIZE);
        assert_eq!(img.stack_pointer(), 0x2004_0000);
        assert_eq!(img.entry(), 0x2_0101);

        // Same seed, same image.
        let again = GenBuilder::default().build().unwrap();
        assert_eq!(img.data, again.data);
        let other = GenBuilder::default().seed(2).build().unwrap();
        assert_ne!(img.data, other.data);
    }

    #[test]
    fn test_base() {
        let img = GenBuilder::default()
            .size(4096)
            .base(0x1008_0000)
            .noise()
            .build()
            .unwrap();
        assert_eq!(img.data.len(), 4096);
        assert_eq!(img.entry(), 0x1008_0101);
        assert!(GenBuilder::default().size(64).build().is_err());
    }

    #[test]
    fn test_noise_vectors() {
        let img = GenBuilder::default().size(8192).noise().build().unwrap();
        assert_eq!(img.stack_pointer(), 0x2004_0000);
        assert_eq!(img.entry(), 0x2_0101);

        // No word past the reset vector repeats within the table.
        let words: Vec<&[u8]> = img.data[8..VECTOR_WORDS * 4].chunks(4).collect();
        for (i, a) in words.iter().enumerate() {
            for b in &words[i + 1..] {
                assert_ne!(a, b);
            }
        }

        let code = GenBuilder::default().size(8192).build().unwrap();
        assert_eq!(code.data[8..12], code.data[60..64]);
    }

    #[test]
    fn test_file() {
        let img = GenBuilder::default().seed(7).build().unwrap();
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.bin");
        img.save(&path).unwrap();

        let loaded = GeneratedImage::from_file(&path, img.base).unwrap();
        assert_eq!(loaded.data, img.data);
        assert_eq!(loaded.entry(), img.entry());

        assert!(GeneratedImage::from_file(tmp.path().join("missing.bin"), 0).is_err());
    }
}
