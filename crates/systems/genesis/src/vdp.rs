//! Genesis VDP: plane A/B/window scanline renderer, sprite pipeline,
//! DMA engine and the V/H interrupt counters.
//!
//! Timing is counted in 68000 cycles: 488 per scanline, 262 lines NTSC.
//! V-int (level 6) pends when the active area ends at line 224; the
//! per-line H-int counter reloads from register 10 outside the active
//! area and pends on underflow inside it (level 4). A status read clears
//! both pending flags and the sprite overflow/collision bits in one read.
//!
//! Layer mixing uses a per-pixel priority buffer: 0 backdrop, 1
//! low-priority plane, 2 high-priority plane or low-priority sprite,
//! 3 high-priority sprite. A pixel is overwritten when the incoming
//! level beats the recorded one (planes at equal level resolve A over B
//! by draw order).
//!
//! DMA has the three documented modes. 68K-to-VDP transfers are executed
//! by the bus (which owns the source memory) against
//! [`Vdp::dma_port_write`]; fill consumes the next data-port write; copy
//! runs internally. Source and length registers update in place as the
//! transfer proceeds. Transfers cost no 68000 cycles, a recorded
//! accuracy compromise.

use lockstep_core::state::{StateReader, StateWriter};

pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 224;

pub const CYCLES_PER_LINE: u32 = 488;
const LINES_PER_FRAME: u16 = 262;

// Status bits
const STATUS_FIFO_EMPTY: u16 = 0x0200;
const STATUS_VINT: u16 = 0x0080;
const STATUS_OVERFLOW: u16 = 0x0040;
const STATUS_COLLISION: u16 = 0x0020;
const STATUS_VBLANK: u16 = 0x0008;

/// A 68K-to-VDP transfer request, executed by the bus which owns the
/// source memory.
#[derive(Debug, Clone, Copy)]
pub struct DmaRequest {
    pub source: u32,
    pub length: u16,
}

pub struct Vdp {
    vram: Box<[u8; 0x10000]>,
    /// 64 CRAM entries (9-bit BGR).
    cram: [u16; 64],
    /// 40 VSRAM entries (10-bit).
    vsram: [u16; 40],
    pub registers: [u8; 24],

    /// Control-port write latch.
    control_pending: bool,
    /// Access code (CD5-CD0).
    code: u8,
    address: u16,
    read_latch: u16,
    /// VRAM fill armed; the next data-port write supplies the value.
    fill_pending: bool,

    line_cycles: u32,
    pub scanline: u16,
    hint_counter: u8,
    pub vint_pending: bool,
    pub hint_pending: bool,
    status: u16,
    pub frame_count: u64,

    framebuffer: Box<[u32; SCREEN_WIDTH * SCREEN_HEIGHT]>,
    pub render_graphics: bool,
}

impl Default for Vdp {
    fn default() -> Self {
        Self::new()
    }
}

impl Vdp {
    pub fn new() -> Self {
        Self {
            vram: Box::new([0; 0x10000]),
            cram: [0; 64],
            vsram: [0; 40],
            registers: [0; 24],
            control_pending: false,
            code: 0,
            address: 0,
            read_latch: 0,
            fill_pending: false,
            line_cycles: 0,
            scanline: 0,
            hint_counter: 0,
            vint_pending: false,
            hint_pending: false,
            status: STATUS_FIFO_EMPTY,
            frame_count: 0,
            framebuffer: Box::new([0; SCREEN_WIDTH * SCREEN_HEIGHT]),
            render_graphics: true,
        }
    }

    pub fn frame_buffer(&self) -> &[u32] {
        &self.framebuffer[..]
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram[..]
    }

    pub fn cram(&self) -> &[u16] {
        &self.cram
    }

    fn display_width(&self) -> usize {
        if self.registers[12] & 0x81 != 0 {
            320
        } else {
            256
        }
    }

    /// Sprites evaluated per line: 20 in H40, 16 in H32.
    fn sprites_per_line(&self) -> usize {
        if self.display_width() == 320 {
            20
        } else {
            16
        }
    }

    fn autoincrement(&self) -> u16 {
        self.registers[15] as u16
    }

    pub fn display_enabled(&self) -> bool {
        self.registers[1] & 0x40 != 0
    }

    /// Interrupt level currently requested (0, 4 or 6).
    pub fn pending_level(&self) -> u8 {
        if self.vint_pending && self.registers[1] & 0x20 != 0 {
            6
        } else if self.hint_pending && self.registers[0] & 0x10 != 0 {
            4
        } else {
            0
        }
    }

    /// Interrupt-acknowledge from the CPU clears the taken level.
    pub fn ack_level(&mut self, level: u8) {
        match level {
            6 => self.vint_pending = false,
            4 => self.hint_pending = false,
            _ => {}
        }
    }

    /// Control port word write. May return a 68K-to-VDP DMA request for
    /// the bus to execute.
    pub fn write_control(&mut self, value: u16) -> Option<DmaRequest> {
        if !self.control_pending && value & 0xC000 == 0x8000 {
            let reg = ((value >> 8) & 0x1F) as usize;
            if reg < self.registers.len() {
                self.registers[reg] = value as u8;
            }
            return None;
        }

        if !self.control_pending {
            self.code = (self.code & 0x3C) | ((value >> 14) as u8 & 0x03);
            self.address = (self.address & 0xC000) | (value & 0x3FFF);
            self.control_pending = true;
            return None;
        }

        self.control_pending = false;
        self.code = (self.code & 0x03) | ((value >> 2) as u8 & 0x3C);
        self.address = (self.address & 0x3FFF) | ((value & 0x03) << 14);

        if self.code & 0x0C == 0 {
            // Read setup primes the latch
            self.read_latch = self.read_word();
        }

        // CD5 set with DMA enabled starts a transfer
        if self.code & 0x20 != 0 && self.registers[1] & 0x10 != 0 {
            let mode = self.registers[23];
            if mode & 0x80 == 0 {
                // 68K -> VDP
                let source = (((mode & 0x7F) as u32) << 17)
                    | ((self.registers[22] as u32) << 9)
                    | ((self.registers[21] as u32) << 1);
                let length = ((self.registers[20] as u16) << 8) | self.registers[19] as u16;
                return Some(DmaRequest { source, length });
            } else if mode & 0x40 == 0 {
                // VRAM fill: armed until the next data write
                self.fill_pending = true;
            } else {
                self.dma_copy();
            }
        }
        None
    }

    /// Control port read: the status word. Clears the pending interrupt
    /// flags and the sprite flags.
    pub fn read_status(&mut self) -> u16 {
        self.control_pending = false;
        let mut v = self.status | STATUS_FIFO_EMPTY;
        if self.vint_pending {
            v |= STATUS_VINT;
        }
        if self.scanline >= self.active_height() {
            v |= STATUS_VBLANK;
        }
        self.vint_pending = false;
        self.hint_pending = false;
        self.status &= !(STATUS_OVERFLOW | STATUS_COLLISION);
        v
    }

    fn active_height(&self) -> u16 {
        // V30 (PAL-only 240-line mode) is not modeled; NTSC is 224
        224
    }

    fn write_vram_word(&mut self, addr: u16, value: u16) {
        let a = addr as usize;
        self.vram[a] = (value >> 8) as u8;
        self.vram[a ^ 1] = value as u8;
    }

    fn read_vram_word(&self, addr: u16) -> u16 {
        let a = (addr & 0xFFFE) as usize;
        ((self.vram[a] as u16) << 8) | self.vram[a + 1] as u16
    }

    fn read_word(&self) -> u16 {
        match self.code & 0x0F {
            0x00 => self.read_vram_word(self.address),
            0x08 => self.cram[((self.address >> 1) & 0x3F) as usize],
            0x04 => self.vsram[(((self.address >> 1) as usize) % 40).min(39)],
            _ => 0,
        }
    }

    /// Data port word write.
    pub fn write_data(&mut self, value: u16) {
        self.control_pending = false;

        if self.fill_pending {
            self.fill_pending = false;
            // Fill writes length bytes of the high byte, stepping by the
            // autoincrement; the first word lands normally
            self.write_vram_word(self.address, value);
            let mut length = ((self.registers[20] as u16) << 8) | self.registers[19] as u16;
            let fill = (value >> 8) as u8;
            let mut addr = self.address;
            loop {
                addr = addr.wrapping_add(self.autoincrement());
                self.vram[addr as usize] = fill;
                length = length.wrapping_sub(1);
                if length == 0 {
                    break;
                }
            }
            self.registers[19] = 0;
            self.registers[20] = 0;
            self.address = addr;
            return;
        }

        match self.code & 0x0F {
            0x01 => self.write_vram_word(self.address, value),
            0x03 => self.cram[((self.address >> 1) & 0x3F) as usize] = value & 0x0EEE,
            0x05 => {
                let idx = ((self.address >> 1) as usize) % 40;
                self.vsram[idx] = value & 0x03FF;
            }
            _ => {}
        }
        self.address = self.address.wrapping_add(self.autoincrement());
    }

    /// Data port word read.
    pub fn read_data(&mut self) -> u16 {
        self.control_pending = false;
        let value = self.read_latch;
        self.address = self.address.wrapping_add(self.autoincrement());
        self.read_latch = self.read_word();
        value
    }

    /// One word of a 68K-to-VDP DMA transfer; updates the in-place
    /// source/length registers as the hardware does.
    pub fn dma_port_write(&mut self, value: u16) {
        match self.code & 0x0F {
            0x01 => self.write_vram_word(self.address, value),
            0x03 => self.cram[((self.address >> 1) & 0x3F) as usize] = value & 0x0EEE,
            0x05 => {
                let idx = ((self.address >> 1) as usize) % 40;
                self.vsram[idx] = value & 0x03FF;
            }
            _ => {}
        }
        self.address = self.address.wrapping_add(self.autoincrement());
    }

    /// Called by the bus after a 68K-to-VDP transfer finishes.
    pub fn dma_finish(&mut self, words: u16) {
        // Length registers count down to zero; source advances
        let advanced = (self.registers[21] as u32 | ((self.registers[22] as u32) << 8))
            .wrapping_add(words as u32);
        self.registers[21] = advanced as u8;
        self.registers[22] = (advanced >> 8) as u8;
        self.registers[19] = 0;
        self.registers[20] = 0;
    }

    fn dma_copy(&mut self) {
        let mut source = ((self.registers[22] as u16) << 8) | self.registers[21] as u16;
        let mut length = ((self.registers[20] as u16) << 8) | self.registers[19] as u16;
        if length == 0 {
            return;
        }
        let mut addr = self.address;
        while length > 0 {
            let byte = self.vram[source as usize];
            self.vram[addr as usize] = byte;
            source = source.wrapping_add(1);
            addr = addr.wrapping_add(self.autoincrement());
            length -= 1;
        }
        self.registers[19] = 0;
        self.registers[20] = 0;
        self.registers[21] = source as u8;
        self.registers[22] = (source >> 8) as u8;
        self.address = addr;
    }

    /// HV counter word: V in the high byte, H approximated from the line
    /// cycle position.
    pub fn hv_counter(&self) -> u16 {
        let v = (self.scanline & 0xFF) as u16;
        let h = ((self.line_cycles * 0xA0) / CYCLES_PER_LINE) as u16 & 0xFF;
        (v << 8) | h
    }

    /// Advance by `cycles` 68000 cycles.
    pub fn tick(&mut self, cycles: u32) {
        self.line_cycles += cycles;
        while self.line_cycles >= CYCLES_PER_LINE {
            self.line_cycles -= CYCLES_PER_LINE;
            self.advance_scanline();
        }
    }

    fn advance_scanline(&mut self) {
        let height = self.active_height();

        if self.scanline < height {
            if self.render_graphics && self.display_enabled() {
                let line = self.scanline;
                self.render_scanline(line);
            }
            // H-int counter decrements through the active area
            if self.hint_counter == 0 {
                self.hint_counter = self.registers[10];
                self.hint_pending = true;
            } else {
                self.hint_counter -= 1;
            }
        } else {
            self.hint_counter = self.registers[10];
        }

        self.scanline += 1;
        if self.scanline == height {
            self.vint_pending = true;
        }
        if self.scanline >= LINES_PER_FRAME {
            self.scanline = 0;
            self.frame_count += 1;
        }
    }

    fn color(&self, palette: usize, index: usize) -> u32 {
        let raw = self.cram[(palette * 16 + index) & 0x3F];
        let r = ((raw & 0x0E) >> 1) as u32 * 36;
        let g = ((raw & 0xE0) >> 5) as u32 * 36;
        let b = ((raw & 0xE00) >> 9) as u32 * 36;
        0xFF00_0000 | (b << 16) | (g << 8) | r
    }

    fn plane_dimensions(&self) -> (u16, u16) {
        let dim = |bits: u8| match bits & 0x03 {
            0 => 32,
            1 => 64,
            _ => 128,
        };
        (dim(self.registers[16]), dim(self.registers[16] >> 4))
    }

    fn hscroll_for_line(&self, line: u16, plane_b: bool) -> u16 {
        let table = ((self.registers[13] as u16) & 0x3F) << 10;
        let offset = match self.registers[11] & 0x03 {
            0 => 0,                      // full-screen scroll
            2 => (line & !7) as u16 * 4, // per-tile
            _ => line * 4,               // per-line (mode 1 behaves as line)
        };
        let addr = table + offset + if plane_b { 2 } else { 0 };
        self.read_vram_word(addr) & 0x3FF
    }

    fn vscroll_for_column(&self, column: usize, plane_b: bool) -> u16 {
        let per_column = self.registers[11] & 0x04 != 0;
        let idx = if per_column { (column / 16) * 2 } else { 0 } + plane_b as usize;
        self.vsram[idx.min(39)] & 0x3FF
    }

    /// Render one plane (A or B) into the line buffers with the given
    /// priority rules.
    #[allow(clippy::too_many_arguments)]
    fn render_plane(
        &self,
        line: u16,
        plane_b: bool,
        name_base: u16,
        high_pass: bool,
        color_out: &mut [u32; SCREEN_WIDTH],
        level: &mut [u8; SCREEN_WIDTH],
        window: Option<(usize, usize)>,
    ) {
        let width = self.display_width();
        let (plane_w, plane_h) = self.plane_dimensions();
        let hscroll = self.hscroll_for_line(line, plane_b);

        for x in 0..width {
            if let Some((start, end)) = window {
                // Skip pixels owned by the window plane
                if x >= start && x < end {
                    continue;
                }
            }
            let vscroll = self.vscroll_for_column(x, plane_b);
            let world_y = (line as u32 + vscroll as u32) % (plane_h as u32 * 8);
            let world_x = (x as u32).wrapping_sub(hscroll as u32) & (plane_w as u32 * 8 - 1);

            let tile_x = (world_x / 8) as u16;
            let tile_y = (world_y / 8) as u16;
            let entry = self
                .read_vram_word(name_base.wrapping_add((tile_y * plane_w + tile_x).wrapping_mul(2)));

            let priority = entry & 0x8000 != 0;
            if priority != high_pass {
                continue;
            }
            let palette = ((entry >> 13) & 0x03) as usize;
            let vflip = entry & 0x1000 != 0;
            let hflip = entry & 0x0800 != 0;
            let tile = entry & 0x07FF;

            let py = if vflip { 7 - (world_y % 8) } else { world_y % 8 };
            let px = if hflip { 7 - (world_x % 8) } else { world_x % 8 };

            let pattern = tile as usize * 32 + py as usize * 4 + (px / 2) as usize;
            let byte = self.vram[pattern & 0xFFFF];
            let color = if px % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            if color == 0 {
                continue;
            }

            let new_level: u8 = if high_pass { 2 } else { 1 };
            // Planes at the same level resolve by draw order (A drawn
            // after B), so equality passes
            if new_level >= level[x] {
                level[x] = new_level;
                color_out[x] = self.color(palette, color as usize);
            }
        }
    }

    /// Sprite line buffer: color + priority per pixel, earlier sprites
    /// (by table order) winning. Sets collision/overflow flags.
    fn sprite_line(&mut self, line: u16, colors: &mut [u32; SCREEN_WIDTH], priority: &mut [u8; SCREEN_WIDTH]) {
        let table = ((self.registers[5] as u16) & 0x7F) << 9;
        let width = self.display_width();
        let limit = self.sprites_per_line();
        let screen_y = line + 128;

        let mut visited = 0;
        let mut on_line = 0;
        let mut sprite = 0u16; // link chain starts at sprite 0
        let mut claimed = [false; SCREEN_WIDTH];

        loop {
            let base = table.wrapping_add(sprite * 8);
            let y = self.read_vram_word(base) & 0x3FF;
            let size = self.read_vram_word(base.wrapping_add(2));
            let h_cells = (((size >> 10) & 0x03) + 1) as u16;
            let v_cells = ((size >> 8) & 0x03) + 1;
            let link = (size & 0x7F) as u16;
            let attr = self.read_vram_word(base.wrapping_add(4));
            let x = self.read_vram_word(base.wrapping_add(6)) & 0x3FF;

            let sprite_height = v_cells * 8;
            if screen_y >= y && screen_y < y + sprite_height {
                on_line += 1;
                if on_line > limit {
                    self.status |= STATUS_OVERFLOW;
                    break;
                }

                let palette = ((attr >> 13) & 0x03) as usize;
                let high = attr & 0x8000 != 0;
                let vflip = attr & 0x1000 != 0;
                let hflip = attr & 0x0800 != 0;
                let tile = attr & 0x07FF;

                let mut row = screen_y - y;
                if vflip {
                    row = sprite_height - 1 - row;
                }
                let cell_row = row / 8;
                let fine_y = row % 8;

                for cell_col in 0..h_cells {
                    let source_col = if hflip { h_cells - 1 - cell_col } else { cell_col };
                    // Sprite tiles are stored column-major
                    let cell_tile = tile + source_col * v_cells as u16 + cell_row;
                    for p in 0..8u16 {
                        let sx = x + cell_col * 8 + p;
                        if sx < 128 {
                            continue;
                        }
                        let px = (sx - 128) as usize;
                        if px >= width {
                            break;
                        }
                        let fine_x = if hflip { 7 - p } else { p };
                        let pattern =
                            cell_tile as usize * 32 + fine_y as usize * 4 + (fine_x / 2) as usize;
                        let byte = self.vram[pattern & 0xFFFF];
                        let color = if fine_x % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                        if color == 0 {
                            continue;
                        }
                        if claimed[px] {
                            self.status |= STATUS_COLLISION;
                            continue;
                        }
                        claimed[px] = true;
                        colors[px] = self.color(palette, color as usize);
                        priority[px] = if high { 3 } else { 2 };
                    }
                }
            }

            visited += 1;
            if link == 0 || link >= 80 || visited >= 80 {
                break;
            }
            sprite = link;
        }
    }

    fn window_range(&self, line: u16) -> Option<(usize, usize)> {
        let width = self.display_width();
        let wh = self.registers[17];
        let wv = self.registers[18];
        let v_base = (wv & 0x1F) as u16 * 8;
        let v_down = wv & 0x80 != 0;
        let in_v = if v_down { line >= v_base } else { line < v_base };
        let h_base = ((wh & 0x1F) as usize * 16).min(width);
        let h_right = wh & 0x80 != 0;
        if in_v {
            Some((0, width))
        } else if h_base == 0 {
            None
        } else if h_right {
            Some((h_base, width))
        } else {
            Some((0, h_base))
        }
    }

    fn render_scanline(&mut self, line: u16) {
        let width = self.display_width();
        let row_base = line as usize * SCREEN_WIDTH;

        let backdrop_pal = ((self.registers[7] >> 4) & 0x03) as usize;
        let backdrop_idx = (self.registers[7] & 0x0F) as usize;
        let backdrop = self.color(backdrop_pal, backdrop_idx);

        let mut colors = [backdrop; SCREEN_WIDTH];
        let mut level = [0u8; SCREEN_WIDTH];

        let plane_a_base = ((self.registers[2] as u16) & 0x38) << 10;
        let plane_b_base = ((self.registers[4] as u16) & 0x07) << 13;
        let window_base = ((self.registers[3] as u16) & 0x3E) << 10;
        let window = self.window_range(line);

        // Sprite pixels are computed once and composited in two passes
        let mut sprite_colors = [0u32; SCREEN_WIDTH];
        let mut sprite_level = [0u8; SCREEN_WIDTH];
        self.sprite_line(line, &mut sprite_colors, &mut sprite_level);

        // Low-priority planes: B then A
        self.render_plane(line, true, plane_b_base, false, &mut colors, &mut level, None);
        self.render_plane(line, false, plane_a_base, false, &mut colors, &mut level, window);

        // Window replaces plane A inside its rectangle (uses no scroll)
        if let Some((start, end)) = window {
            self.render_window(line, window_base, false, start, end, &mut colors, &mut level);
        }

        // Low-priority sprites (level 2 beats level 1 planes)
        for x in 0..width {
            if sprite_level[x] == 2 && sprite_level[x] > level[x] {
                level[x] = 2;
                colors[x] = sprite_colors[x];
            }
        }

        // High-priority planes (level 2, equality wins over low sprites)
        self.render_plane(line, true, plane_b_base, true, &mut colors, &mut level, None);
        self.render_plane(line, false, plane_a_base, true, &mut colors, &mut level, window);
        if let Some((start, end)) = window {
            self.render_window(line, window_base, true, start, end, &mut colors, &mut level);
        }

        // High-priority sprites beat everything
        for x in 0..width {
            if sprite_level[x] == 3 {
                colors[x] = sprite_colors[x];
            }
        }

        self.framebuffer[row_base..row_base + width].copy_from_slice(&colors[..width]);
        // H32 mode leaves the right margin at backdrop
        for x in width..SCREEN_WIDTH {
            self.framebuffer[row_base + x] = backdrop;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_window(
        &self,
        line: u16,
        name_base: u16,
        high_pass: bool,
        start: usize,
        end: usize,
        colors: &mut [u32; SCREEN_WIDTH],
        level: &mut [u8; SCREEN_WIDTH],
    ) {
        // Window plane: unscrolled, 64-tile-wide nametable in H40
        let plane_w: u16 = if self.display_width() == 320 { 64 } else { 32 };
        let tile_y = line / 8;
        let fine_y = line % 8;

        for x in start..end {
            let tile_x = (x / 8) as u16;
            let entry = self
                .read_vram_word(name_base.wrapping_add((tile_y * plane_w + tile_x).wrapping_mul(2)));
            let priority = entry & 0x8000 != 0;
            if priority != high_pass {
                continue;
            }
            let palette = ((entry >> 13) & 0x03) as usize;
            let vflip = entry & 0x1000 != 0;
            let hflip = entry & 0x0800 != 0;
            let tile = entry & 0x07FF;
            let py = if vflip { 7 - fine_y } else { fine_y };
            let px = if hflip { 7 - (x % 8) } else { x % 8 };
            let pattern = tile as usize * 32 + py as usize * 4 + px / 2;
            let byte = self.vram[pattern & 0xFFFF];
            let color = if px % 2 == 0 { byte >> 4 } else { byte & 0x0F };
            if color == 0 {
                continue;
            }
            let new_level: u8 = if high_pass { 2 } else { 1 };
            if new_level >= level[x] {
                level[x] = new_level;
                colors[x] = self.color(palette, color as usize);
            }
        }
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        w.put_bytes(&self.vram[..]);
        for c in &self.cram {
            w.put_u16(*c);
        }
        for v in &self.vsram {
            w.put_u16(*v);
        }
        w.put_bytes(&self.registers);
        w.put_bool(self.control_pending);
        w.put_u8(self.code);
        w.put_u16(self.address);
        w.put_u16(self.read_latch);
        w.put_bool(self.fill_pending);
        w.put_u32(self.line_cycles);
        w.put_u16(self.scanline);
        w.put_u8(self.hint_counter);
        w.put_bool(self.vint_pending);
        w.put_bool(self.hint_pending);
        w.put_u16(self.status);
        w.put_u64(self.frame_count);
    }

    pub fn load_state(&mut self, r: &mut StateReader) {
        r.get_bytes(&mut self.vram[..]);
        for c in &mut self.cram {
            *c = r.get_u16();
        }
        for v in &mut self.vsram {
            *v = r.get_u16();
        }
        r.get_bytes(&mut self.registers);
        self.control_pending = r.get_bool();
        self.code = r.get_u8();
        self.address = r.get_u16();
        self.read_latch = r.get_u16();
        self.fill_pending = r.get_bool();
        self.line_cycles = r.get_u32();
        self.scanline = r.get_u16();
        self.hint_counter = r.get_u8();
        self.vint_pending = r.get_bool();
        self.hint_pending = r.get_bool();
        self.status = r.get_u16();
        self.frame_count = r.get_u64();
    }

    pub const STATE_SIZE: usize =
        0x10000 + 128 + 80 + 24 + 1 + 1 + 2 + 2 + 1 + 4 + 2 + 1 + 1 + 1 + 2 + 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg_write(vdp: &mut Vdp, reg: u8, val: u8) {
        vdp.write_control(0x8000 | ((reg as u16) << 8) | val as u16);
    }

    fn set_vram_addr_write(vdp: &mut Vdp, addr: u16) {
        vdp.write_control(0x4000 | (addr & 0x3FFF));
        vdp.write_control((addr >> 14) & 0x03);
    }

    #[test]
    fn register_writes_via_control_port() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 1, 0x64);
        assert_eq!(vdp.registers[1], 0x64);
    }

    #[test]
    fn vram_word_write_and_read() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 15, 2); // autoincrement
        set_vram_addr_write(&mut vdp, 0x1000);
        vdp.write_data(0xBEEF);
        // Big-endian in VRAM
        assert_eq!(vdp.vram[0x1000], 0xBE);
        assert_eq!(vdp.vram[0x1001], 0xEF);

        // Read back
        vdp.write_control(0x1000 & 0x3FFF);
        vdp.write_control(0);
        assert_eq!(vdp.read_data(), 0xBEEF);
    }

    #[test]
    fn cram_write_masks_to_nine_bits() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 15, 2);
        // CRAM write: CD = 0b000011
        vdp.write_control(0xC000);
        vdp.write_control(0x0000);
        vdp.write_data(0xFFFF);
        assert_eq!(vdp.cram[0], 0x0EEE);
    }

    #[test]
    fn vint_pends_at_line_224_and_status_clears() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 1, 0x60); // display + vint enable
        vdp.tick(CYCLES_PER_LINE * 225);
        assert!(vdp.vint_pending);
        assert_eq!(vdp.pending_level(), 6);
        let status = vdp.read_status();
        assert!(status & STATUS_VINT != 0);
        assert_eq!(vdp.pending_level(), 0);
    }

    #[test]
    fn hint_counter_underflow_requests_level_4() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 0, 0x10); // hint enable
        reg_write(&mut vdp, 10, 3); // reload value
        // Counter reloads outside active area, then underflows after
        // (reload + 1) active lines of the next frame
        vdp.tick(CYCLES_PER_LINE * 262);
        vdp.tick(CYCLES_PER_LINE * 5);
        assert!(vdp.hint_pending);
        assert_eq!(vdp.pending_level(), 4);
        vdp.ack_level(4);
        assert!(!vdp.hint_pending);
    }

    #[test]
    fn vint_has_priority_over_hint() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 0, 0x10);
        reg_write(&mut vdp, 1, 0x20);
        vdp.vint_pending = true;
        vdp.hint_pending = true;
        assert_eq!(vdp.pending_level(), 6);
        vdp.ack_level(6);
        assert_eq!(vdp.pending_level(), 4);
    }

    #[test]
    fn dma_transfer_request_from_control_write() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 1, 0x10); // DMA enable
        reg_write(&mut vdp, 15, 2);
        reg_write(&mut vdp, 19, 0x10); // length 0x10 words
        reg_write(&mut vdp, 20, 0x00);
        reg_write(&mut vdp, 21, 0x00); // source 0x2000
        reg_write(&mut vdp, 22, 0x10);
        reg_write(&mut vdp, 23, 0x00);
        // VRAM write with CD5 set
        vdp.write_control(0x4000);
        let req = vdp.write_control(0x0080).expect("dma request");
        assert_eq!(req.source, 0x2000);
        assert_eq!(req.length, 0x10);

        for i in 0..req.length {
            vdp.dma_port_write(0x1100 + i);
        }
        vdp.dma_finish(req.length);
        assert_eq!(vdp.read_vram_word(0), 0x1100);
        assert_eq!(vdp.registers[19], 0);
        assert_eq!(vdp.registers[20], 0);
        // Source low registers advanced by the word count
        assert_eq!(vdp.registers[21], 0x10);
    }

    #[test]
    fn vram_fill_consumes_next_data_write() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 1, 0x10);
        reg_write(&mut vdp, 15, 1);
        reg_write(&mut vdp, 19, 0x04); // length 4
        reg_write(&mut vdp, 23, 0x80); // fill mode
        vdp.write_control(0x4000 | 0x100);
        assert!(vdp.write_control(0x0080).is_none());
        vdp.write_data(0xAA55);
        // First word written normally, then 4 fill bytes of 0xAA
        assert_eq!(vdp.vram[0x100], 0xAA);
        assert_eq!(vdp.vram[0x101], 0x55);
        assert_eq!(vdp.vram[0x102], 0xAA);
        assert_eq!(vdp.vram[0x105], 0xAA);
    }

    #[test]
    fn vram_copy_moves_bytes() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 1, 0x10);
        reg_write(&mut vdp, 15, 1);
        vdp.vram[0x500] = 0xDE;
        vdp.vram[0x501] = 0xAD;
        reg_write(&mut vdp, 19, 2); // length
        reg_write(&mut vdp, 21, 0x00); // source 0x500
        reg_write(&mut vdp, 22, 0x05);
        reg_write(&mut vdp, 23, 0xC0); // copy mode
        vdp.write_control(0x4000 | 0x200);
        vdp.write_control(0x0080);
        assert_eq!(vdp.vram[0x200], 0xDE);
        assert_eq!(vdp.vram[0x201], 0xAD);
    }

    #[test]
    fn frame_counter_monotonic() {
        let mut vdp = Vdp::new();
        vdp.tick(CYCLES_PER_LINE * 262 * 3);
        assert_eq!(vdp.frame_count, 3);
    }

    #[test]
    fn renders_plane_a_tile() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 1, 0x44); // display enable
        reg_write(&mut vdp, 2, 0x30); // plane A at 0xC000
        reg_write(&mut vdp, 12, 0x81); // H40
        reg_write(&mut vdp, 16, 0x01); // 64x32 plane
        // Tile 1: solid color 1
        for i in 0..32 {
            vdp.vram[32 + i] = 0x11;
        }
        // Plane A entry (0,0) = tile 1
        vdp.vram[0xC000] = 0x00;
        vdp.vram[0xC001] = 0x01;
        // Palette 0 color 1 = bright red
        vdp.cram[1] = 0x000E;
        vdp.tick(CYCLES_PER_LINE);
        let px = vdp.frame_buffer()[0];
        assert_eq!(px & 0x00FF_FFFF, 36 * 7); // red channel only
    }

    #[test]
    fn sprite_renders_and_collides() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 1, 0x44);
        reg_write(&mut vdp, 5, 0x70); // SAT at 0xE000
        reg_write(&mut vdp, 12, 0x81);
        // Tile 2 solid color 3
        for i in 0..32 {
            vdp.vram[64 + i] = 0x33;
        }
        vdp.cram[3] = 0x00E0; // green
        let sat = 0xE000;
        // Sprite 0: at screen (0,0) -> coords 128,128, 1x1 cell, tile 2, link 1
        vdp.vram[sat] = 0x00;
        vdp.vram[sat + 1] = 0x80;
        vdp.vram[sat + 2] = 0x00; // size 1x1
        vdp.vram[sat + 3] = 0x01; // link -> sprite 1
        vdp.vram[sat + 4] = 0x00;
        vdp.vram[sat + 5] = 0x02; // tile 2
        vdp.vram[sat + 6] = 0x00;
        vdp.vram[sat + 7] = 0x80; // x = 128
        // Sprite 1: overlapping, same position, link 0
        vdp.vram[sat + 8] = 0x00;
        vdp.vram[sat + 9] = 0x80;
        vdp.vram[sat + 10] = 0x00;
        vdp.vram[sat + 11] = 0x00; // link end
        vdp.vram[sat + 12] = 0x00;
        vdp.vram[sat + 13] = 0x02;
        vdp.vram[sat + 14] = 0x00;
        vdp.vram[sat + 15] = 0x80;

        vdp.tick(CYCLES_PER_LINE);
        let px = vdp.frame_buffer()[0];
        assert_eq!(px & 0x00FF_FF00, (36u32 * 7) << 8); // green
        assert!(vdp.status & STATUS_COLLISION != 0);
    }

    #[test]
    fn state_round_trip() {
        let mut vdp = Vdp::new();
        reg_write(&mut vdp, 2, 0x30);
        set_vram_addr_write(&mut vdp, 0x100);
        vdp.write_data(0x1234);
        vdp.tick(10_000);

        let mut w = StateWriter::new();
        vdp.save_state(&mut w);
        let blob = w.into_vec();
        assert_eq!(blob.len(), Vdp::STATE_SIZE);

        let mut restored = Vdp::new();
        restored.load_state(&mut StateReader::new(&blob));
        assert_eq!(restored.read_vram_word(0x100), 0x1234);
        assert_eq!(restored.scanline, vdp.scanline);
        assert_eq!(restored.frame_count, vdp.frame_count);
    }
}
