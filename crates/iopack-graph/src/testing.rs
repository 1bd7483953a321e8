use iopack_package::{
    HeaderBuilder, Interner, PackageArena, PackageHeader, PackageLoader, PackageResult, PackageSlot,
};

/// Interner and arena populated through [`HeaderBuilder`].
#[derive(Default)]
pub(crate) struct Fixture {
    pub interner: Interner,
    pub arena: PackageArena,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, build: impl FnOnce(&mut HeaderBuilder)) -> PackageSlot {
        let mut builder = HeaderBuilder::new();
        build(&mut builder);
        let header = builder.build();
        self.try_add(name, &header).unwrap()
    }

    pub fn try_add(&mut self, name: &str, header: &PackageHeader) -> PackageResult<PackageSlot> {
        PackageLoader::load_into(
            &mut self.interner,
            &mut self.arena,
            name,
            header,
            header.export_data_size(),
        )
    }
}
