use crate::error::{DriverError, Result};
use crate::provider::CloudApi;

use super::Driver;

/// Where the boot volume comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Platform alias, e.g. `ubuntu:20.04`
    Alias(String),
    /// Concrete image id
    Id(String),
}

impl ImageRef {
    pub fn is_alias(&self) -> bool {
        matches!(self, ImageRef::Alias(_))
    }
}

/// Split `us/las` into region and location ids.
pub fn split_location(location: &str) -> Result<(&str, &str)> {
    match location.split_once('/') {
        Some((region, loc)) if !region.is_empty() && !loc.is_empty() => Ok((region, loc)),
        _ => Err(DriverError::Config(format!(
            "location '{}' must have the form region/location",
            location
        ))),
    }
}

impl<C: CloudApi> Driver<C> {
    /// Resolve `image` against aliases, then image ids, then image names.
    ///
    /// The name search is a case-insensitive substring match restricted to
    /// the disk's image type (SSD volumes boot from HDD images) and the
    /// machine's location. The first match in listing order wins.
    pub async fn resolve_image(
        &self,
        image: &str,
        location: &str,
        disk_type: &str,
    ) -> Result<ImageRef> {
        let (region, loc) = split_location(location)?;

        let location_info = self.client.get_location(region, loc).await?;
        if location_info
            .properties
            .image_aliases
            .iter()
            .any(|alias| alias == image)
        {
            tracing::debug!("Image '{}' is an alias in {}", image, location);
            return Ok(ImageRef::Alias(image.to_string()));
        }

        match self.client.get_image(image).await {
            Ok(found) if !found.id.is_empty() => return Ok(ImageRef::Id(found.id)),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let image_type = if disk_type == "SSD" { "HDD" } else { disk_type };
        let needle = image.to_lowercase();

        self.client
            .list_images()
            .await?
            .into_iter()
            .find(|candidate| {
                let props = &candidate.properties;
                props
                    .name
                    .as_deref()
                    .is_some_and(|name| !name.is_empty() && name.to_lowercase().contains(&needle))
                    && props.image_type.as_deref() == Some(image_type)
                    && props.location.as_deref() == Some(location)
            })
            .map(|found| ImageRef::Id(found.id))
            .ok_or_else(|| {
                DriverError::Image(format!(
                    "could not find image '{}' of type {} in {}",
                    image, image_type, location
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeCloud;

    fn driver(cloud: FakeCloud) -> Driver<FakeCloud> {
        Driver::new(cloud)
    }

    #[tokio::test]
    async fn test_alias_wins() {
        let cloud = FakeCloud::new();
        cloud.add_alias("ubuntu:20.04");
        cloud.add_image("img-1", "ubuntu:20.04", "HDD", "us/las");

        let image = driver(cloud)
            .resolve_image("ubuntu:20.04", "us/las", "HDD")
            .await
            .unwrap();
        assert_eq!(image, ImageRef::Alias("ubuntu:20.04".to_string()));
        assert!(image.is_alias());
    }

    #[tokio::test]
    async fn test_literal_image_id() {
        let cloud = FakeCloud::new();
        cloud.add_image("8fc5f591-338e-11eb-a681-1e659523cb7b", "Ubuntu-20.04", "HDD", "us/las");

        let image = driver(cloud)
            .resolve_image("8fc5f591-338e-11eb-a681-1e659523cb7b", "us/las", "HDD")
            .await
            .unwrap();
        assert_eq!(
            image,
            ImageRef::Id("8fc5f591-338e-11eb-a681-1e659523cb7b".to_string())
        );
    }

    #[tokio::test]
    async fn test_substring_search_filters_type_and_location() {
        let cloud = FakeCloud::new();
        cloud.add_image("img-fra", "Ubuntu-20.04-LTS", "HDD", "de/fra");
        cloud.add_image("img-cd", "Ubuntu-20.04-LTS", "CDROM", "us/las");
        cloud.add_image("img-las", "Ubuntu-20.04-LTS", "HDD", "us/las");

        let image = driver(cloud)
            .resolve_image("ubuntu-20.04", "us/las", "SSD")
            .await
            .unwrap();
        assert_eq!(image, ImageRef::Id("img-las".to_string()));
    }

    #[tokio::test]
    async fn test_no_match_is_error() {
        let cloud = FakeCloud::new();
        cloud.add_image("img-1", "Debian-11", "HDD", "us/las");

        let err = driver(cloud)
            .resolve_image("centos", "us/las", "HDD")
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Image(_)));
    }

    #[test]
    fn test_split_location() {
        assert_eq!(split_location("de/fra").unwrap(), ("de", "fra"));
        assert!(split_location("fra").is_err());
        assert!(split_location("/fra").is_err());
    }
}
