use crate::{
    config::{ExportConfig, IconSpec},
    error_util::{AnyhowExt, SourceNotFound},
};
use anyhow::{anyhow, Result};
use icns::{IconFamily, IconType};
use ico::{IconDir, IconDirEntry, IconImage, ResourceType};
use image::{imageops::FilterType, io::Reader, DynamicImage, GenericImageView};
use log::{debug, info, warn};
use std::{
    borrow::Cow,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

const ICO_FILE: &str = "icon.ico";
const ICNS_FILE: &str = "icon.icns";
const RECOMMENDED_SOURCE_SIZE: u32 = 512;
/// Square sizes with an icns element type, largest first.
const ICNS_SIZES: [u32; 8] = [1024, 512, 256, 128, 64, 48, 32, 16];

/// A PNG written by [`export_pngs`], with the raster it was encoded from.
#[derive(Debug, Clone)]
pub struct ExportedIcon {
    pub name: String,
    pub path: PathBuf,
    pub image: DynamicImage,
}

#[derive(Debug)]
pub struct ExportSummary {
    pub pngs: Vec<PathBuf>,
    pub ico: PathBuf,
    pub icns: PathBuf,
}

pub fn load_source(path: &Path) -> Result<DynamicImage> {
    let reader = match Reader::open(path) {
        Ok(reader) => reader,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SourceNotFound(path.to_owned()).into())
        }
        Err(e) => return Err(e).anyhow_at("open", path),
    };
    // the content decides the codec, not the extension
    let image = reader
        .with_guessed_format()
        .anyhow_at("read", path)?
        .decode()
        .anyhow_at("decode", path)?;
    let (width, height) = image.dimensions();
    info!("loaded {} ({}x{})", path.display(), width, height);
    if width != height {
        warn!("source is not square, icons will be stretched");
    }
    if width.min(height) < RECOMMENDED_SOURCE_SIZE {
        warn!(
            "source is smaller than {0}x{0}, large icons will be upscaled",
            RECOMMENDED_SOURCE_SIZE
        );
    }
    Ok(image)
}

pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        info!("Creating `{}` folder", dir.display());
        fs::create_dir_all(dir).anyhow_at("create", dir)?;
    }
    Ok(())
}

/// Resizes `source` to every entry of `icons` and writes `<name>.png` into
/// `dir`. Aspect ratio is not kept; each output is exactly `size`×`size`.
pub fn export_pngs(
    source: &DynamicImage,
    icons: &[IconSpec],
    dir: &Path,
    filter: FilterType,
) -> Result<Vec<ExportedIcon>> {
    icons
        .iter()
        .map(|icon| {
            let path = dir.join(format!("{}.png", icon.name));
            let image = source.resize_exact(icon.size, icon.size, filter);
            image.save(&path).anyhow_at("write", &path)?;
            debug!("wrote {} ({}x{})", path.display(), icon.size, icon.size);
            Ok(ExportedIcon {
                name: icon.name.clone(),
                path,
                image,
            })
        })
        .collect()
}

pub fn export_ico(
    source: &DynamicImage,
    sizes: &[u32],
    dir: &Path,
    filter: FilterType,
) -> Result<PathBuf> {
    let mut icon_dir = IconDir::new(ResourceType::Icon);
    for &size in sizes {
        let rgba = source.resize_exact(size, size, filter).into_rgba8();
        let image = IconImage::from_rgba_data(size, size, rgba.into_raw());
        icon_dir.add_entry(IconDirEntry::encode(&image).anyhow()?);
    }
    let path = dir.join(ICO_FILE);
    write_file(&path, |w| icon_dir.write(w))?;
    debug!("wrote {} with {} frame(s)", path.display(), sizes.len());
    Ok(path)
}

/// The source as it goes into the icns: unchanged when its size has an
/// element type, otherwise resized to the largest [`ICNS_SIZES`] entry that
/// fits inside it.
fn icns_source(source: &DynamicImage, filter: FilterType) -> Cow<'_, DynamicImage> {
    let (width, height) = source.dimensions();
    if IconType::from_pixel_size(width, height).is_some() {
        return Cow::Borrowed(source);
    }
    let fits = width.min(height);
    let size = ICNS_SIZES
        .iter()
        .copied()
        .find(|&s| s <= fits)
        .unwrap_or(ICNS_SIZES[ICNS_SIZES.len() - 1]);
    debug!("icns: resizing source from {}x{} to {}x{}", width, height, size, size);
    Cow::Owned(source.resize_exact(size, size, filter))
}

/// Packs `source` and `entries` into `icon.icns`. The source is fitted to an
/// icns size; each entry must already be one of the sizes ICNS knows
/// (16, 32, 48, 64, 128, 256, 512, 1024).
pub fn export_icns(
    source: &DynamicImage,
    entries: &[&ExportedIcon],
    dir: &Path,
    filter: FilterType,
) -> Result<PathBuf> {
    let mut family = IconFamily::new();
    let source = icns_source(source, filter);
    let rasters = std::iter::once(("source", source.as_ref()))
        .chain(entries.iter().map(|e| (e.name.as_str(), &e.image)));
    for (name, raster) in rasters {
        let (width, height) = raster.dimensions();
        let icon_type = IconType::from_pixel_size(width, height)
            .ok_or_else(|| anyhow!("`{}` is {}x{}, which has no icns icon type", name, width, height))?;
        if family.has_icon_with_type(icon_type) {
            warn!("icns already has a {:?} icon, skipping `{}`", icon_type, name);
            continue;
        }
        let rgba = raster.to_rgba8();
        let image = icns::Image::from_data(icns::PixelFormat::RGBA, width, height, rgba.into_raw())
            .anyhow()?;
        family.add_icon_with_type(&image, icon_type).anyhow()?;
        debug!("icns: added `{}` as {:?}", name, icon_type);
    }
    let path = dir.join(ICNS_FILE);
    write_file(&path, |w| family.write(w))?;
    Ok(path)
}

fn write_file<F>(path: &Path, encode: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut writer = BufWriter::new(File::create(path).anyhow_at("create", path)?);
    encode(&mut writer).anyhow_at("write", path)?;
    writer.flush().anyhow_at("write", path)
}

pub fn run(config: &ExportConfig) -> Result<ExportSummary> {
    let source = load_source(&config.source)?;
    ensure_output_dir(&config.output_dir)?;

    let filter = FilterType::from(config.filter);
    let exported = export_pngs(&source, &config.icons, &config.output_dir, filter)?;
    let ico = export_ico(&source, &config.ico_sizes, &config.output_dir, filter)?;

    let icns_entries = config
        .icns_entries
        .iter()
        .map(|name| {
            exported
                .iter()
                .find(|e| &e.name == name)
                .ok_or_else(|| anyhow!("icns entry `{}` was not exported", name))
        })
        .collect::<Result<Vec<_>>>()?;
    let icns = export_icns(&source, &icns_entries, &config.output_dir, filter)?;

    info!("Done!");
    Ok(ExportSummary {
        pngs: exported.into_iter().map(|e| e.path).collect(),
        ico,
        icns,
    })
}
