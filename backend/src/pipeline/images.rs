use crate::catalog::{AssetLibrary, NewAsset, ProductCatalog};
use crate::error::ImportResult;
use common::model::settings::ImportSettings;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{load_from_memory, DynamicImage, GenericImageView};
use log::{debug, warn};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Extensions probed in the source folder, in priority order.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// A source image was processed and attached.
    Attached { asset_id: i64, path: PathBuf },
    /// An asset configured in the image overrides was attached.
    Override { asset_id: i64 },
    /// No image exists for the raw id; the product was left untouched.
    Missing,
}

/// Attaches the image named after a raw id to a product.
pub struct ImageAssociator<'a, C> {
    catalog: &'a C,
    settings: &'a ImportSettings,
}

impl<'a, C: ProductCatalog + AssetLibrary> ImageAssociator<'a, C> {
    pub fn new(catalog: &'a C, settings: &'a ImportSettings) -> Self {
        Self { catalog, settings }
    }

    /// First `<source_image_dir>/<raw_id>.<ext>` that exists.
    pub fn locate(&self, raw_id: &str) -> Option<PathBuf> {
        if !is_plain_file_stem(raw_id) {
            warn!("raw id {:?} is not usable as a file name, skipping image lookup", raw_id);
            return None;
        }
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.settings.source_image_dir.join(format!("{raw_id}.{ext}")))
            .find(|candidate| candidate.is_file())
    }

    pub fn associate(&self, raw_id: &str, product_id: i64) -> ImportResult<ImageOutcome> {
        if let Some(&asset_id) = self.settings.image_overrides.get(raw_id) {
            if self.catalog.asset_exists(asset_id)? {
                self.catalog.set_image(product_id, asset_id)?;
                return Ok(ImageOutcome::Override { asset_id });
            }
            warn!(
                "image override for {} points at missing asset {}, falling back to the source folder",
                raw_id, asset_id
            );
        }

        let Some(source) = self.locate(raw_id) else {
            return Ok(ImageOutcome::Missing);
        };

        let bytes = fs::read(&source)?;
        let img = load_from_memory(&bytes)?;
        let img = self.resize(img);
        let (width, height) = img.dimensions();

        let target_dir = self.settings.asset_dir.join(product_id.to_string());
        fs::create_dir_all(&target_dir)?;
        let target = target_dir.join(format!("{raw_id}.jpg"));
        write_jpeg(&img, &target)?;
        debug!("wrote {} ({}x{})", target.display(), width, height);

        let asset_id = self.catalog.register_asset(&NewAsset {
            path: target.display().to_string(),
            title: raw_id.to_string(),
            mime_type: "image/jpeg".to_string(),
            parent_id: Some(product_id),
            width,
            height,
        })?;
        self.catalog.set_image(product_id, asset_id)?;
        Ok(ImageOutcome::Attached {
            asset_id,
            path: target,
        })
    }

    fn resize(&self, img: DynamicImage) -> DynamicImage {
        let (w, h) = (self.settings.image_width, self.settings.image_height);
        if w == 0 || h == 0 {
            return img;
        }
        if self.settings.image_crop {
            img.resize_to_fill(w, h, FilterType::Lanczos3)
        } else {
            img.resize(w, h, FilterType::Lanczos3)
        }
    }
}

fn is_plain_file_stem(raw_id: &str) -> bool {
    !raw_id.is_empty() && !raw_id.contains(['/', '\\']) && !raw_id.contains("..")
}

/// JPEG has no alpha channel, so transparency is flattened onto white.
fn write_jpeg(img: &DynamicImage, path: &Path) -> ImportResult<()> {
    let (w, h) = img.dimensions();
    let mut background = image::RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut background, &img.to_rgba8(), 0, 0);
    let rgb = DynamicImage::ImageRgba8(background).to_rgb8();

    let writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(writer, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sqlite::SqliteCatalog;
    use crate::catalog::Product;
    use crate::store::testing::temp_store;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir) -> ImportSettings {
        ImportSettings {
            source_image_dir: dir.path().join("raw"),
            asset_dir: dir.path().join("assets"),
            ..ImportSettings::default()
        }
    }

    fn write_source(settings: &ImportSettings, name: &str, w: u32, h: u32) {
        fs::create_dir_all(&settings.source_image_dir).unwrap();
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([200, 10, 10]));
        img.save(settings.source_image_dir.join(name)).unwrap();
    }

    #[test]
    fn missing_image_leaves_the_product_untouched() {
        let (dir, store) = temp_store();
        let catalog = SqliteCatalog::new(store);
        let settings = settings_in(&dir);
        let id = catalog.save_product(&Product::default(), &[]).unwrap();
        let existing = catalog
            .register_asset(&NewAsset {
                path: "products/old.jpg".to_string(),
                title: "old".to_string(),
                mime_type: "image/jpeg".to_string(),
                parent_id: Some(id),
                width: 400,
                height: 400,
            })
            .unwrap();
        catalog.set_image(id, existing).unwrap();

        let outcome = ImageAssociator::new(&catalog, &settings).associate("A1", id).unwrap();
        assert_eq!(outcome, ImageOutcome::Missing);
        assert_eq!(catalog.get_product(id).unwrap().unwrap().image_id, Some(existing));
    }

    #[test]
    fn source_image_is_cropped_and_attached() {
        let (dir, store) = temp_store();
        let catalog = SqliteCatalog::new(store);
        let settings = settings_in(&dir);
        write_source(&settings, "A1.png", 800, 600);
        let id = catalog.save_product(&Product::default(), &[]).unwrap();

        let associator = ImageAssociator::new(&catalog, &settings);
        let ImageOutcome::Attached { asset_id, path } = associator.associate("A1", id).unwrap()
        else {
            panic!("expected the image to be attached");
        };
        assert_eq!(path, settings.asset_dir.join(id.to_string()).join("A1.jpg"));
        assert_eq!(image::open(&path).unwrap().dimensions(), (400, 400));
        assert_eq!(catalog.get_product(id).unwrap().unwrap().image_id, Some(asset_id));

        // re-association overwrites the file and reuses the asset row
        let again = associator.associate("A1", id).unwrap();
        assert!(matches!(again, ImageOutcome::Attached { asset_id: a, .. } if a == asset_id));
    }

    #[test]
    fn fit_mode_preserves_aspect_ratio() {
        let (dir, store) = temp_store();
        let catalog = SqliteCatalog::new(store);
        let settings = ImportSettings {
            image_crop: false,
            ..settings_in(&dir)
        };
        write_source(&settings, "B2.jpg", 800, 400);
        let id = catalog.save_product(&Product::default(), &[]).unwrap();

        let outcome = ImageAssociator::new(&catalog, &settings).associate("B2", id).unwrap();
        let ImageOutcome::Attached { path, .. } = outcome else {
            panic!("expected the image to be attached");
        };
        assert_eq!(image::open(&path).unwrap().dimensions(), (400, 200));
    }

    #[test]
    fn jpg_wins_over_png_and_traversal_is_refused() {
        let (dir, store) = temp_store();
        let catalog = SqliteCatalog::new(store);
        let settings = settings_in(&dir);
        write_source(&settings, "C3.png", 10, 10);
        write_source(&settings, "C3.jpg", 10, 10);

        let associator = ImageAssociator::new(&catalog, &settings);
        assert_eq!(
            associator.locate("C3"),
            Some(settings.source_image_dir.join("C3.jpg"))
        );
        assert_eq!(associator.locate("../C3"), None);
    }

    #[test]
    fn override_asset_takes_precedence() {
        let (dir, store) = temp_store();
        let catalog = SqliteCatalog::new(store);
        let asset_id = catalog
            .register_asset(&NewAsset {
                path: "shared/logo.jpg".to_string(),
                title: "logo".to_string(),
                mime_type: "image/jpeg".to_string(),
                parent_id: None,
                width: 10,
                height: 10,
            })
            .unwrap();
        let mut settings = settings_in(&dir);
        settings.image_overrides.insert("D4".to_string(), asset_id);
        write_source(&settings, "D4.jpg", 10, 10);
        let id = catalog.save_product(&Product::default(), &[]).unwrap();

        let outcome = ImageAssociator::new(&catalog, &settings).associate("D4", id).unwrap();
        assert_eq!(outcome, ImageOutcome::Override { asset_id });
        assert_eq!(catalog.get_product(id).unwrap().unwrap().image_id, Some(asset_id));
    }
}
