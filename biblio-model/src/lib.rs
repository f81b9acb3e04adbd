//! Shared data model for the biblio library manager: strongly typed ids, the
//! source-priority enum, and the Book/File/Chapter/Job entities that the
//! scan engine and the store operate on.

pub mod book;
pub mod chapter;
pub mod data_source;
pub mod entities;
pub mod error;
pub mod file;
pub mod ids;
pub mod job;

pub use book::{derive_sort_title, Book};
pub use chapter::{Chapter, ChapterNode};
pub use data_source::{priority_of, DataSource, UnknownDataSource};
pub use entities::{
    AuthorRef, Genre, Imprint, NamedEntityKind, NarratorRef, Person, Publisher, Series, SeriesRef,
    Tag,
};
pub use error::{ModelError, Result as ModelResult};
pub use file::{CoverRef, File, FileType, Identifier, IdentifierType};
pub use ids::{
    BookId, ChapterId, FileId, GenreId, ImprintId, JobId, LibraryId, PersonId, PublisherId,
    SeriesId, TagId,
};
pub use job::{Job, JobStatus, JobType};
