use crate::models::{Booking, Event, GalleryImage, ImageRef, NewBooking, NewEvent, Photo, Project};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::login,
        crate::routes::auth_check,
        crate::routes::logout,
        crate::routes::upload_section_image,
        crate::routes::public_section_images,
        crate::routes::create_booking,
        crate::routes::list_bookings,
        crate::routes::update_booking_status,
        crate::routes::create_event,
        crate::routes::upload_photo,
        crate::routes::face_search,
    ),
    components(schemas(
        Booking, NewBooking, Event, NewEvent, Photo, GalleryImage, Project, ImageRef,
        crate::routes::LoginRequest, crate::routes::SessionInfo,
        crate::routes::SectionImageResponse, crate::routes::UpdateBookingStatus
    )),
    tags(
        (name = "auth", description = "Admin session management"),
        (name = "images", description = "Section imagery and config"),
        (name = "bookings", description = "Booking inquiries"),
        (name = "events", description = "Events and photo galleries"),
    )
)]
pub struct ApiDoc;
