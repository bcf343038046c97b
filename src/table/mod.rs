/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

pub mod heap;
pub mod iterator;

pub use heap::TableHeap;
pub use iterator::TableIterator;
