//! DXT1 / DXT5 (BC1 / BC3) block decompression.

use byteorder::{ByteOrder as _, LittleEndian};

use super::rgb565;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    DXT1,
    DXT5,
}

impl BlockFormat {
    /// Bytes per 4x4 block.
    pub fn block_bytes(self) -> usize {
        match self {
            BlockFormat::DXT1 => 8,
            BlockFormat::DXT5 => 16,
        }
    }

    /// Size of one mip level, `None` if it does not fit into `usize`.
    pub fn data_size(self, width: u32, height: u32) -> Option<usize> {
        let blocks_x = (width as usize).div_ceil(4);
        let blocks_y = (height as usize).div_ceil(4);
        blocks_x.checked_mul(blocks_y)?.checked_mul(self.block_bytes())
    }

    /// Decodes `data` into top-down RGBA rows of `width * height` pixels.
    /// `data` has to hold at least [`BlockFormat::data_size`] bytes.
    pub fn decode(self, data: &[u8], width: u32, height: u32) -> Vec<u8> {
        let (width, height) = (width as usize, height as usize);
        let blocks_x = width.div_ceil(4);
        let mut rgba = vec![0; width * height * 4];

        for (i, block) in data.chunks_exact(self.block_bytes()).enumerate() {
            let (start_x, start_y) = ((i % blocks_x) * 4, (i / blocks_x) * 4);
            if start_y >= height {
                break;
            }

            let texels = match self {
                BlockFormat::DXT1 => color_block(block, true),
                BlockFormat::DXT5 => {
                    let mut texels = color_block(&block[8..], false);
                    for (texel, alpha) in texels.iter_mut().zip(alpha_block(&block[..8])) {
                        texel[3] = alpha;
                    }
                    texels
                }
            };

            for (j, texel) in texels.iter().enumerate() {
                let (x, y) = (start_x + j % 4, start_y + j / 4);
                if x >= width || y >= height {
                    continue;
                }
                let offset = (y * width + x) * 4;
                rgba[offset..offset + 4].copy_from_slice(texel);
            }
        }

        rgba
    }
}

/// The 16 texels of an 8 byte color block, row by row.
/// With `punch_through` a block with `color0 <= color1` uses three colors and transparent black.
fn color_block(block: &[u8], punch_through: bool) -> [[u8; 4]; 16] {
    let color0 = LittleEndian::read_u16(&block[0..2]);
    let color1 = LittleEndian::read_u16(&block[2..4]);
    let indices = LittleEndian::read_u32(&block[4..8]);

    let [r0, g0, b0] = rgb565(color0).map(u16::from);
    let [r1, g1, b1] = rgb565(color1).map(u16::from);
    let mix = |a: u16, b: u16, wa: u16, wb: u16| ((a * wa + b * wb) / (wa + wb)) as u8;

    let c0 = [r0 as u8, g0 as u8, b0 as u8, 255];
    let c1 = [r1 as u8, g1 as u8, b1 as u8, 255];
    let palette = if color0 > color1 || !punch_through {
        [
            c0,
            c1,
            [mix(r0, r1, 2, 1), mix(g0, g1, 2, 1), mix(b0, b1, 2, 1), 255],
            [mix(r0, r1, 1, 2), mix(g0, g1, 1, 2), mix(b0, b1, 1, 2), 255],
        ]
    } else {
        [
            c0,
            c1,
            [mix(r0, r1, 1, 1), mix(g0, g1, 1, 1), mix(b0, b1, 1, 1), 255],
            [0, 0, 0, 0],
        ]
    };

    std::array::from_fn(|i| palette[((indices >> (i * 2)) & 0b11) as usize])
}

/// The 16 alpha values of an 8 byte DXT5 alpha block.
fn alpha_block(block: &[u8]) -> [u8; 16] {
    let (a0, a1) = (u16::from(block[0]), u16::from(block[1]));
    let indices = LittleEndian::read_u48(&block[2..8]);

    let mix = |wa: u16, wb: u16| ((a0 * wa + a1 * wb) / (wa + wb)) as u8;
    let palette = if a0 > a1 {
        [
            a0 as u8,
            a1 as u8,
            mix(6, 1),
            mix(5, 2),
            mix(4, 3),
            mix(3, 4),
            mix(2, 5),
            mix(1, 6),
        ]
    } else {
        [a0 as u8, a1 as u8, mix(4, 1), mix(3, 2), mix(2, 3), mix(1, 4), 0, 255]
    };

    std::array::from_fn(|i| palette[((indices >> (i * 3)) & 0b111) as usize])
}
