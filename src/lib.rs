pub mod coords;
pub mod download;
pub mod error;
pub mod model;
pub mod projection;
pub mod reader;
pub mod sentinel;
pub mod session;
pub mod settings;
pub mod unpack;
pub mod writer;

pub use coords::CoordinateAxes;
pub use download::{download_all, download_file, download_names, list_names, FetchOutcome};
pub use error::{GribError, Result, TransientError};
pub use model::{BandRecord, GribContents, RasterEnvelope, ReprojectedCornerMesh};
pub use projection::{transform_corners, TargetCrs};
pub use reader::read_grib;
pub use session::{Conversion, ReadConversion, VerifiedConversion};
pub use settings::{ArchiveSettings, Calendar, TimeEncoding, TimeUnit, VerifiedSettings};
pub use unpack::{unpack_bz2, UnpackOutcome};
pub use writer::{write_archive, WriteOutcome};
