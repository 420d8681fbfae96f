/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

/// log2 of the number of bytes in a gigabyte
pub const LOG_BYTES_IN_GBYTE: u8 = 30;
/// The number of bytes in a gigabyte
pub const BYTES_IN_GBYTE: usize = 1 << LOG_BYTES_IN_GBYTE;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = 3;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

/// log2 of the number of bytes in a page
pub const LOG_BYTES_IN_PAGE: u8 = 12;
/// The number of bytes in a page
pub const BYTES_IN_PAGE: usize = 1 << LOG_BYTES_IN_PAGE;

/// log2 of the default region size (256 KiB)
pub const DEFAULT_LOG_REGION_SIZE: u8 = 18;
/// Smallest region size we accept (one page)
pub const MIN_LOG_REGION_SIZE: u8 = LOG_BYTES_IN_PAGE;
/// Largest region size we accept (16 MiB)
pub const MAX_LOG_REGION_SIZE: u8 = 24;

/// log2 of the bytes covered by one card
pub const LOG_BYTES_IN_CARD: u8 = 8;
/// The number of heap bytes covered by one card
pub const BYTES_IN_CARD: usize = 1 << LOG_BYTES_IN_CARD;

/// Every object starts on a word boundary and its size is a multiple of a word.
pub const MIN_OBJECT_ALIGNMENT: usize = BYTES_IN_WORD;
/// Two header words: the status word and the hash word.
pub const OBJECT_HEADER_BYTES: usize = 2 * BYTES_IN_WORD;
/// Arrays store their length after the header.
pub const ARRAY_HEADER_BYTES: usize = OBJECT_HEADER_BYTES + BYTES_IN_WORD;
/// The smallest object (and the smallest free chunk) we ever create.
pub const MIN_OBJECT_SIZE: usize = OBJECT_HEADER_BYTES;

/// Age saturates at this value. It has to fit in the header's age bits.
pub const MAX_OBJECT_AGE: u8 = 15;
