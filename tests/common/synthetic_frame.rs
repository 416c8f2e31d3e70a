use line_follow::vision::Frame;

pub const YELLOW: [u8; 3] = [255, 255, 0];
pub const BLACK: [u8; 3] = [0, 0, 0];

/// Black frame of the given size.
pub fn black_frame(width: u32, height: u32) -> Frame {
    Frame::filled(width, height, BLACK)
}

/// Black frame with a yellow square of odd side `2 * half + 1` centered on `(x0, y0)`.
pub fn frame_with_square(width: u32, height: u32, x0: u32, y0: u32, half: u32) -> Frame {
    let mut frame = black_frame(width, height);
    frame.fill_rect(x0 - half, y0 - half, x0 + half + 1, y0 + half + 1, YELLOW);
    frame
}
