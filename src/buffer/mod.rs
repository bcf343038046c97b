/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

pub mod manager;
pub mod replacer;

pub use manager::{read_frame, write_frame, BufferPoolManager, Frame, FrameHandle};
pub use replacer::{ClockReplacer, LruReplacer, Replacer};
