use std::path::Path;

use anyhow::Result;

use fitpulse_core::FitpulseService;
use fitpulse_core::models::{BodyProfile, ProfileInput, UserId};

use super::helpers::{print_json, read_image};

fn print_profile(p: &BodyProfile) {
    if let Some(name) = &p.name {
        println!("Name:   {name}");
    }
    if let Some(age) = p.age {
        println!("Age:    {age}");
    }
    if let Some(gender) = &p.gender {
        println!("Gender: {gender}");
    }
    if let Some(h) = p.height_cm {
        println!("Height: {h:.1} cm");
    }
    if let Some(w) = p.weight_kg {
        println!("Weight: {w:.1} kg");
    }
    match (p.bmi, p.bmi_band) {
        (Some(bmi), Some(band)) => println!("BMI:    {bmi:.2} ({band:?})"),
        (Some(bmi), None) => println!("BMI:    {bmi:.2}"),
        _ => {}
    }
    if let Some(url) = p.image_url.as_deref().filter(|u| !u.is_empty()) {
        println!("Photo:  {url}");
    }
}

pub(crate) async fn cmd_profile_show(svc: &FitpulseService, user: &UserId, json: bool) -> Result<()> {
    let profile = svc.get_body_profile(user).await?;
    if json {
        return print_json(&profile);
    }
    print_profile(&profile);
    Ok(())
}

/// `create` fails when a profile already exists; otherwise fields are merged.
pub(crate) async fn cmd_profile_set(
    svc: &FitpulseService,
    user: &UserId,
    input: ProfileInput,
    create: bool,
    json: bool,
) -> Result<()> {
    let profile = if create {
        svc.create_body_profile(user, input).await?
    } else {
        svc.upsert_body_profile(user, input).await?
    };
    if json {
        return print_json(&profile);
    }
    println!("{}", if create { "Profile created." } else { "Profile saved." });
    print_profile(&profile);
    Ok(())
}

pub(crate) async fn cmd_profile_photo(
    svc: &FitpulseService,
    user: &UserId,
    path: &Path,
    json: bool,
) -> Result<()> {
    let (bytes, content_type) = read_image(path)?;
    let profile = svc.upload_profile_photo(user, bytes, content_type).await?;
    if json {
        return print_json(&profile);
    }
    println!("Profile photo updated.");
    print_profile(&profile);
    Ok(())
}
